//! Observability backend probes and the bottleneck detector against mock
//! Prometheus, Jaeger and Loki servers

use loadpulse::backends::{
    BackendClient, BottleneckDetector, JaegerClient, LokiClient, PrometheusClient, ProbeReport,
    ProbeStatus,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> BackendClient {
    BackendClient::with_probe_defaults().unwrap()
}

fn has_line(report: &ProbeReport, status: ProbeStatus, message: &str) -> bool {
    report
        .lines
        .iter()
        .any(|l| l.status == status && l.message == message)
}

fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    format!("http://{}", listener.local_addr().unwrap())
}

#[tokio::test]
async fn test_prometheus_probe_reports_targets_and_metrics() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{"metric": {"job": "forum-api"}, "value": [1718000000.0, "1"]}]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/targets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "activeTargets": [
                    {"labels": {"job": "forum-api"}, "scrapePool": "forum-api", "health": "up"},
                    {"labels": {"job": "loki"}, "scrapePool": "loki", "health": "down"}
                ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/label/__name__/values"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": [
                "api_requests_total",
                "http_request_duration_seconds_bucket",
                "http_request_duration_seconds_count",
                "prometheus_build_info"
            ]
        })))
        .mount(&server)
        .await;

    let report = PrometheusClient::new(server.uri(), client()).probe().await;

    assert!(has_line(&report, ProbeStatus::Pass, "Prometheus is accessible"));
    assert!(has_line(&report, ProbeStatus::Pass, "target forum-api: up"));
    assert!(has_line(&report, ProbeStatus::Fail, "target loki: down"));
    assert!(has_line(
        &report,
        ProbeStatus::Pass,
        "http_request_duration_seconds* (2 metrics from forum-api)"
    ));
    assert!(has_line(
        &report,
        ProbeStatus::Warn,
        "jaeger_* (no metrics found from jaeger-collector)"
    ));
    assert!(has_line(&report, ProbeStatus::Info, "Total metrics available: 4"));
    assert!(has_line(&report, ProbeStatus::Info, "Total API requests: 1"));
    assert!(report.has_failures());
}

#[tokio::test]
async fn test_unreachable_prometheus_is_a_failure() {
    let report = PrometheusClient::new(closed_port_url(), client())
        .probe()
        .await;

    assert!(report.has_failures());
    assert_eq!(report.lines.len(), 1);
}

#[tokio::test]
async fn test_prometheus_error_status_means_no_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "errorType": "bad_data",
            "error": "parse error",
            "data": {"result": []}
        })))
        .mount(&server)
        .await;

    let prometheus = PrometheusClient::new(server.uri(), client());
    assert!(prometheus.query("up{").await.is_none());
}

#[tokio::test]
async fn test_jaeger_probe_lists_services_and_traces() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Jaeger UI</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "# TYPE jaeger_collector_spans_received_total counter\n\
             jaeger_collector_spans_received_total{svc=\"forum-api\"} 120\n\
             jaeger_collector_spans_saved_total{result=\"ok\"} 118\n",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/services"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": ["forum-api", "jaeger-query"]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/services/forum-api/operations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"name": "GET /boards", "spanKind": "server"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/services/jaeger-query/operations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/traces"))
        .and(query_param("service", "forum-api"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "traceID": "4bf92f3577b34da6a3ce929d0e0e4736",
                "spans": [
                    {"operationName": "GET /boards", "startTime": 1000, "duration": 2500},
                    {"operationName": "SELECT boards", "startTime": 1200, "duration": 1000}
                ]
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/traces"))
        .and(query_param("service", "jaeger-query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let report = JaegerClient::new(server.uri(), server.uri(), client())
        .probe()
        .await;

    assert!(!report.has_failures(), "{:?}", report.lines);
    assert!(has_line(&report, ProbeStatus::Pass, "Jaeger UI is accessible"));
    assert!(has_line(&report, ProbeStatus::Pass, "Found 1 recent traces for forum-api"));
    assert!(has_line(&report, ProbeStatus::Warn, "No recent traces found for jaeger-query"));
    assert!(has_line(&report, ProbeStatus::Warn, "No operations found for 'jaeger-query'"));
    assert!(has_line(
        &report,
        ProbeStatus::Pass,
        "jaeger_collector_spans_saved_total"
    ));
    assert!(has_line(
        &report,
        ProbeStatus::Warn,
        "jaeger_collector_traces_saved_total missing"
    ));

    let traces = report
        .lines
        .iter()
        .find(|l| l.message == "Found 1 recent traces for forum-api")
        .unwrap();
    assert_eq!(
        traces.details,
        vec!["4bf92f3577b34da6... (2 spans, 2.5ms) operations: GET /boards, SELECT boards".to_string()]
    );
}

#[tokio::test]
async fn test_loki_probe_runs_sample_queries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ready"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": ["container_name", "filename", "job"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/label/job/values"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": ["containerlogs", "forum-app"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/label/container_name/values"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": ["forum-backend"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/query_range"))
        .and(query_param("direction", "backward"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [{
                    "stream": {"job": "containerlogs", "container_name": "forum-backend"},
                    "values": [["1718000000000000000", "GET /boards 200 trace_id=4bf92f35"]]
                }]
            }
        })))
        .mount(&server)
        .await;

    let report = LokiClient::new(server.uri(), client()).probe().await;

    assert!(!report.has_failures());
    assert!(has_line(&report, ProbeStatus::Pass, "Loki is accessible"));
    assert!(has_line(
        &report,
        ProbeStatus::Pass,
        "All container logs: found 1 log entries"
    ));
    assert!(has_line(
        &report,
        ProbeStatus::Pass,
        "Found 1 log entries with trace information"
    ));
    let jobs = report
        .lines
        .iter()
        .find(|l| l.message == "Available jobs")
        .unwrap();
    assert_eq!(jobs.details, vec!["containerlogs".to_string(), "forum-app".to_string()]);
}

#[tokio::test]
async fn test_loki_not_ready_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Ingester not ready"))
        .mount(&server)
        .await;

    let report = LokiClient::new(server.uri(), client()).probe().await;

    assert!(report.has_failures());
}

#[tokio::test]
async fn test_detector_flags_slow_paths_and_memory() {
    let server = MockServer::start().await;
    let detector =
        BottleneckDetector::new(PrometheusClient::new(server.uri(), client()), "http://jaeger:16686");

    let vector = |result: serde_json::Value| {
        ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"resultType": "vector", "result": result}
        }))
    };
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .and(query_param("query", detector.slow_endpoints_query().as_str()))
        .respond_with(vector(json!([
            {"metric": {"path": "/slow"}, "value": [1, "742.5"]}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .and(query_param("query", detector.db_usage_query().as_str()))
        .respond_with(vector(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .and(query_param("query", BottleneckDetector::MEMORY_QUERY))
        .respond_with(vector(json!([{"metric": {}, "value": [1, "612.4"]}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .and(query_param("query", BottleneckDetector::ERROR_RATIO_QUERY))
        .respond_with(vector(json!([{"metric": {}, "value": [1, "0.002"]}])))
        .mount(&server)
        .await;

    let report = detector.analyze().await;

    assert!(report.flagged());
    let section = |title: &str| {
        report
            .sections
            .iter()
            .find(|s| s.title == title)
            .unwrap_or_else(|| panic!("missing section {}", title))
    };

    let slow = section("Slow Endpoints (P95 > 500ms)");
    assert!(slow.flagged);
    assert_eq!(slow.lines, vec!["Path: /slow - P95 Latency: 742.50ms".to_string()]);

    let db = section("High Database Usage (>50 RPS)");
    assert!(!db.flagged);
    assert_eq!(db.lines, vec!["No high database usage detected.".to_string()]);

    let memory = section("Memory Usage");
    assert!(memory.flagged);
    assert_eq!(memory.lines[0], "Memory Usage: 612.40 MB");

    let errors = section("Error Rates");
    assert!(!errors.flagged);
    assert_eq!(errors.lines, vec!["HTTP Error Rate: 0.20%".to_string()]);

    let traces = section("Slowest Traces");
    assert_eq!(traces.lines[0], "To view slow traces, visit: http://jaeger:16686");
}
