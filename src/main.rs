//! loadpulse command-line entry point

use clap::Parser;
use loadpulse::analyzer::{AnalyzerConfig, PerformanceAnalyzer};
use loadpulse::backends::{Backends, BottleneckDetector, ProbeReport};
use loadpulse::cli::{CheckTarget, Cli, Command, DEFAULT_CONFIG_PATH};
use loadpulse::config::{CONFIG_TEMPLATE, Config};
use loadpulse::error::{AppError, AppResult};
use loadpulse::forum::ForumApi;
use loadpulse::handlers::{self, AppState};
use loadpulse::metrics::Metrics;
use loadpulse::notify::{AlertForwarder, TelegramNotifier, telegram};
use loadpulse::scenarios::{self, BurstConfig, NPlusOneConfig, ScenarioContext, UsersPlan};
use loadpulse::traffic::{
    HttpMethod, IdCache, LoadDriver, LoadPlan, RequestExecutor, RunReport, StopSignal,
};
use serde_json::Value;
use loadpulse::{report, telemetry};
use std::process::ExitCode;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Load the config file; a missing default file falls back to defaults
fn load_config(cli: &Cli) -> AppResult<Config> {
    let mut config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(AppError::ConfigFileRead { ref source, .. })
            if cli.config == DEFAULT_CONFIG_PATH
                && source.kind() == std::io::ErrorKind::NotFound =>
        {
            Config::default_for(DEFAULT_BASE_URL)
        }
        Err(e) => return Err(e),
    };

    if let Some(base_url) = &cli.base_url {
        config.target.base_url = base_url.clone();
        config.validate()?;
    }
    Ok(config)
}

/// Stop signal that fires on Ctrl-C
fn stop_on_ctrl_c() -> StopSignal {
    let stop = StopSignal::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal.stop(),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
    stop
}

fn print_metrics(metrics: &Metrics) {
    match metrics.gather() {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::error!(error = %e, "Failed to gather metrics"),
    }
}

fn parse_payload(payload: Option<String>) -> AppResult<Option<Value>> {
    payload
        .map(|p| serde_json::from_str::<Value>(&p))
        .transpose()
        .map_err(|e| AppError::Validation(format!("--payload is not valid JSON: {}", e)))
}

async fn run_analyzer(
    config: &Config,
    endpoint: Option<String>,
    method: String,
    payload: Option<String>,
    iterations: usize,
) -> AppResult<()> {
    let executor = RequestExecutor::from_config(&config.http)?;
    let ids = Arc::new(IdCache::new(config.load.max_stored_ids));
    let api = ForumApi::new(&config.target.base_url, executor, ids, config.load.page_size);
    let analyzer = PerformanceAnalyzer::new(
        api,
        AnalyzerConfig {
            iterations,
            ..AnalyzerConfig::default()
        },
        stop_on_ctrl_c(),
    );

    tracing::info!(target_url = %config.target.base_url, iterations, "Analyzing endpoint latency");
    let analysis = match endpoint {
        Some(path) => {
            let method: HttpMethod = method.parse().map_err(AppError::Validation)?;
            analyzer
                .run_endpoint(&path, method, parse_payload(payload)?)
                .await
        }
        None => analyzer.run_sweep().await,
    };

    print!(
        "{}",
        report::render_analysis(&analysis, &config.backends.jaeger_url)
    );
    Ok(())
}

async fn run_traffic(config: &Config, command: Command) -> AppResult<()> {
    let metrics = Arc::new(
        Metrics::new().map_err(|e| AppError::Internal(format!("Failed to register metrics: {}", e)))?,
    );
    let executor = RequestExecutor::from_config(&config.http)?.with_metrics(metrics.clone());
    let ids = Arc::new(IdCache::new(config.load.max_stored_ids));
    let api = ForumApi::new(&config.target.base_url, executor, ids, config.load.page_size);
    let driver = LoadDriver::new(config.load.max_concurrency, stop_on_ctrl_c());
    let ctx = ScenarioContext::new(api, driver);

    tracing::info!(target_url = %config.target.base_url, "Generating traffic");

    let (reports, run): (Vec<RunReport>, _) = match command {
        Command::Load {
            endpoint,
            method,
            payload,
            rps,
            run,
        } => {
            let method: HttpMethod = method.parse().map_err(AppError::Validation)?;
            let payload = parse_payload(payload)?;
            let plan = LoadPlan::new(endpoint, method, payload, rps, run.duration())?;
            (vec![scenarios::load(&ctx, &plan).await], run)
        }
        Command::NPlusOne { run } => {
            let config = NPlusOneConfig {
                duration: run.duration(),
                ..NPlusOneConfig::default()
            };
            (vec![scenarios::n_plus_one::run(&ctx, &config).await], run)
        }
        Command::Slow { run } => {
            let config = BurstConfig::slow(run.duration());
            (vec![scenarios::slow(&ctx, &config).await], run)
        }
        Command::Memory { run } => {
            let config = BurstConfig::memory(run.duration());
            (vec![scenarios::memory(&ctx, &config).await], run)
        }
        Command::All { endpoint, rps, run } => {
            let plan = LoadPlan::new(endpoint, HttpMethod::Get, None, rps, run.duration())?;
            (scenarios::all(&ctx, &plan, run.duration()).await, run)
        }
        Command::Users {
            contributors,
            viewers,
            seed,
            run,
        } => {
            let plan = UsersPlan {
                contributors,
                viewers,
                duration: run.duration(),
                seed,
            };
            (vec![scenarios::users::run(&ctx, &plan).await], run)
        }
        other => {
            return Err(AppError::Internal(format!(
                "{:?} does not generate traffic",
                other
            )));
        }
    };

    for report in &reports {
        println!("{}", report::render_run(report));
    }
    if run.print_metrics {
        print_metrics(&metrics);
    }
    Ok(())
}

async fn run_checks(config: &Config, target: CheckTarget) -> AppResult<bool> {
    let backends = Backends::from_config(&config.backends)?;
    let reports: Vec<ProbeReport> = match target {
        CheckTarget::Metrics => vec![backends.prometheus.probe().await],
        CheckTarget::Traces => vec![backends.jaeger.probe().await],
        CheckTarget::Logs => vec![backends.loki.probe().await],
        CheckTarget::All => backends.probe_all().await,
    };

    for probe in &reports {
        println!("{}", report::render_probe(probe));
    }
    if reports.len() > 1 {
        println!("{}", report::render_probe_summary(&reports));
    }
    Ok(!reports.iter().any(ProbeReport::has_failures))
}

async fn run_alert_bot(config: &Config) -> AppResult<()> {
    let token = telegram::bot_token().ok_or_else(|| {
        AppError::Config(format!("{} must be set", telegram::BOT_TOKEN_ENV))
    })?;
    let chat_id = config.notifier.resolve_chat_id().ok_or_else(|| {
        AppError::Config(format!(
            "notifier.chat_id or {} must be set",
            loadpulse::config::CHAT_ID_ENV
        ))
    })?;

    let metrics = Arc::new(
        Metrics::new().map_err(|e| AppError::Internal(format!("Failed to register metrics: {}", e)))?,
    );
    let notifier = TelegramNotifier::new(
        &config.notifier.api_base,
        token,
        chat_id,
        config.http.timeouts(),
    )?;
    let forwarder = AlertForwarder::new(Arc::new(notifier)).with_metrics(metrics.clone());

    let addr = config.notifier.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Cannot listen on {}: {}", addr, e)))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };
    handlers::serve(listener, AppState::new(forwarder, metrics), shutdown).await
}

async fn run(cli: Cli) -> AppResult<ExitCode> {
    if let Command::Config { output } = &cli.command {
        match output {
            Some(path) => {
                std::fs::write(path, CONFIG_TEMPLATE).map_err(|e| {
                    AppError::Config(format!("Failed to write '{}': {}", path, e))
                })?;
                eprintln!("Configuration template written to {}", path);
            }
            None => print!("{}", CONFIG_TEMPLATE),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    telemetry::init(&config.observability.log_level);

    match cli.command {
        command if command.generates_traffic() => run_traffic(&config, command).await?,
        Command::Check { target } => {
            if !run_checks(&config, target).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Detect => {
            let backends = Backends::from_config(&config.backends)?;
            let detector =
                BottleneckDetector::new(backends.prometheus, &config.backends.jaeger_url);
            println!("{}", report::render_bottlenecks(&detector.analyze().await));
        }
        Command::Analyze {
            endpoint,
            method,
            payload,
            iterations,
        } => run_analyzer(&config, endpoint, method, payload, iterations).await?,
        Command::AlertBot => run_alert_bot(&config).await?,
        _ => {}
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "loadpulse failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
