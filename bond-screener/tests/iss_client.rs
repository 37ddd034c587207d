//! Integration tests for the ISS client against a mock HTTP server.
//!
//! Covers response normalization, multi-mode merging, retry bounds,
//! pagination and passport handling.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bond_common::IssConfig;
use bond_screener::data::{authenticate, BondDataSource, IssClient, TradingMode};
use bond_screener::screener::Fetcher;

// ============================================================================
// Helpers
// ============================================================================

const GROUP_58: &str = "/engines/stock/markets/bonds/boardgroups/58/securities.json";
const GROUP_7: &str = "/engines/stock/markets/bonds/boardgroups/7/securities.json";

fn config(server: &MockServer) -> IssConfig {
    IssConfig {
        base_url: server.uri(),
        auth_url: format!("{}/authenticate", server.uri()),
        max_retries: 2,
        retry_backoff_ms: 0,
        ..IssConfig::default()
    }
}

fn listing(rows: &[(&str, &str, f64)]) -> serde_json::Value {
    let securities: Vec<_> = rows
        .iter()
        .map(|(secid, board, _)| json!([secid, board, format!("Bond {}", secid), 1000]))
        .collect();
    let marketdata: Vec<_> = rows
        .iter()
        .map(|(secid, board, y)| json!([secid, board, y]))
        .collect();

    json!({
        "securities": {
            "metadata": {
                "SECID": {"type": "string"},
                "BOARDID": {"type": "string"},
                "SHORTNAME": {"type": "string"},
                "FACEVALUE": {"type": "double"}
            },
            "columns": ["SECID", "BOARDID", "SHORTNAME", "FACEVALUE"],
            "data": securities
        },
        "marketdata": {
            "metadata": {"YIELD": {"type": "double"}},
            "columns": ["SECID", "BOARDID", "YIELD"],
            "data": marketdata
        }
    })
}

async fn mount_listing(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_listing_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_58))
        .and(query_param("iss.meta", "on"))
        .and(query_param("limit", "unlimited"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(&[("A", "TQCB", 9.5), ("B", "TQOB", 7.25)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = IssClient::new(&config(&server)).unwrap();
    let dataset = client
        .fetch_listing(&TradingMode::BoardGroup(58))
        .await
        .unwrap();

    assert_eq!(dataset.secids(), vec!["A", "B"]);
    assert_eq!(dataset.instruments()[0].yield_pct(), Some(9.5));
    assert_eq!(dataset.instruments()[1].short_name(), Some("Bond B"));
    assert_eq!(dataset.instruments()[1].face_value(), Some(1000.0));
}

#[tokio::test]
async fn test_missing_column_is_parse_error() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        GROUP_58,
        json!({"securities": {"columns": ["BOARDID", "SHORTNAME"], "data": [["TQCB", "x"]]}}),
    )
    .await;

    let client = IssClient::new(&config(&server)).unwrap();
    let err = client
        .fetch_listing(&TradingMode::BoardGroup(58))
        .await
        .unwrap_err();

    assert!(err.is_parse());
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_non_json_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_58))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = IssClient::new(&config(&server)).unwrap();
    let err = client
        .fetch_listing(&TradingMode::BoardGroup(58))
        .await
        .unwrap_err();

    // parse errors are not retried
    assert!(err.is_parse());
}

#[tokio::test]
async fn test_board_mode_url() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "/engines/stock/markets/bonds/boards/TQOB/securities.json",
        listing(&[("SU26238RMFS4", "TQOB", 14.0)]),
    )
    .await;

    let client = IssClient::new(&config(&server)).unwrap();
    let dataset = client
        .fetch_listing(&"tqob".parse::<TradingMode>().unwrap())
        .await
        .unwrap();
    assert_eq!(dataset.len(), 1);
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test]
async fn test_server_error_retried_and_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_58))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = IssClient::new(&config(&server)).unwrap();
    let err = client
        .fetch_listing(&TradingMode::BoardGroup(58))
        .await
        .unwrap_err();

    assert!(err.is_network());
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_transient_error_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_58))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_listing(&server, GROUP_58, listing(&[("A", "TQCB", 9.0)])).await;

    let client = IssClient::new(&config(&server)).unwrap();
    let dataset = client
        .fetch_listing(&TradingMode::BoardGroup(58))
        .await
        .unwrap();
    assert_eq!(dataset.len(), 1);
}

// ============================================================================
// Multi-mode fetch
// ============================================================================

#[tokio::test]
async fn test_fetch_dedups_across_modes() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        GROUP_58,
        listing(&[("A", "TQCB", 9.0), ("B", "TQCB", 8.0)]),
    )
    .await;
    mount_listing(
        &server,
        GROUP_7,
        listing(&[("B", "TQIR", 11.0), ("C", "TQIR", 6.0)]),
    )
    .await;

    let client = Arc::new(IssClient::new(&config(&server)).unwrap());
    let outcome = Fetcher::new(client)
        .fetch(&[TradingMode::BoardGroup(58), TradingMode::BoardGroup(7)])
        .await
        .unwrap();

    assert_eq!(outcome.dataset.secids(), vec!["A", "B", "C"]);
    assert_eq!(outcome.duplicates, 1);
    let b = &outcome.dataset.instruments()[1];
    assert_eq!(b.board_id(), "TQCB");
    assert_eq!(b.yield_pct(), Some(8.0));
}

#[tokio::test]
async fn test_fetch_fails_fast_by_default() {
    let server = MockServer::start().await;
    mount_listing(&server, GROUP_58, listing(&[("A", "TQCB", 9.0)])).await;
    Mock::given(method("GET"))
        .and(path(GROUP_7))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = Arc::new(IssClient::new(&config(&server)).unwrap());
    let err = Fetcher::new(client)
        .fetch(&[TradingMode::BoardGroup(58), TradingMode::BoardGroup(7)])
        .await
        .unwrap_err();

    assert!(err.is_network());
    assert!(err.to_string().contains("trading mode 7"));
}

#[tokio::test]
async fn test_fetch_skips_failed_mode_when_enabled() {
    let server = MockServer::start().await;
    mount_listing(&server, GROUP_58, listing(&[("A", "TQCB", 9.0)])).await;
    mount_listing(
        &server,
        GROUP_7,
        json!({"securities": {"columns": ["SECID"], "data": [["X"]]}}),
    )
    .await;

    let client = Arc::new(IssClient::new(&config(&server)).unwrap());
    let outcome = Fetcher::new(client)
        .with_skip_failed_modes(true)
        .fetch(&[TradingMode::BoardGroup(58), TradingMode::BoardGroup(7)])
        .await
        .unwrap();

    assert_eq!(outcome.dataset.secids(), vec!["A"]);
    assert_eq!(outcome.failed_modes.len(), 1);
    assert_eq!(outcome.failed_modes[0].mode, "7");
}

#[tokio::test]
async fn test_fetch_all_modes_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.max_retries = 0;
    let client = Arc::new(IssClient::new(&cfg).unwrap());
    let err = Fetcher::new(client)
        .with_skip_failed_modes(true)
        .fetch(&[TradingMode::BoardGroup(58), TradingMode::BoardGroup(7)])
        .await
        .unwrap_err();

    assert!(err.is_network());
    assert!(err.to_string().contains("all 2 trading modes failed"));
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_listing_pagination_stops_on_short_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_58))
        .and(query_param("start", "0"))
        .and(query_param("limit", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(&[("A", "TQCB", 9.0), ("B", "TQCB", 8.0)])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(GROUP_58))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[("C", "TQCB", 7.0)])))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.page_size = Some(2);
    let client = IssClient::new(&cfg).unwrap();
    let dataset = client
        .fetch_listing(&TradingMode::BoardGroup(58))
        .await
        .unwrap();

    assert_eq!(dataset.secids(), vec!["A", "B", "C"]);
    assert_eq!(dataset.instruments()[2].yield_pct(), Some(7.0));
}

#[tokio::test]
async fn test_trade_history_follows_cursor() {
    let server = MockServer::start().await;
    let route = "/history/engines/stock/markets/bonds/boards/TQCB/securities/A.json";

    Mock::given(method("GET"))
        .and(path(route))
        .and(query_param("start", "0"))
        .and(query_param("from", "2026-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "history": {"columns": ["SECID", "NUMTRADES"], "data": [["A", 410], ["A", 350]]},
            "history.cursor": {"columns": ["INDEX", "TOTAL", "PAGESIZE"], "data": [[0, 3, 2]]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "history": {"columns": ["SECID", "NUMTRADES"], "data": [["A", 520]]},
            "history.cursor": {"columns": ["INDEX", "TOTAL", "PAGESIZE"], "data": [[2, 3, 2]]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = IssClient::new(&config(&server)).unwrap();
    let counts = client
        .fetch_trade_counts("TQCB", "A", date("2026-03-01"))
        .await
        .unwrap();
    assert_eq!(counts, vec![410.0, 350.0, 520.0]);
}

#[tokio::test]
async fn test_coupon_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/securities/A/bondization.json"))
        .and(query_param("iss.only", "coupons"))
        .and(query_param("from", "2026-03-15"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "coupons": {
                "columns": ["coupondate", "secid"],
                "data": [["2026-04-01", "A"], ["2026-10-01", "A"], ["2027-04-01", "A"]]
            }
        })))
        .mount(&server)
        .await;

    let client = IssClient::new(&config(&server)).unwrap();
    let left = client
        .fetch_coupon_count("A", date("2026-03-15"))
        .await
        .unwrap();
    assert_eq!(left, 3);
}

// ============================================================================
// Passport
// ============================================================================

#[tokio::test]
async fn test_passport_cookie_sent_on_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/authenticate"))
        .and(header("authorization", "Basic dXNlcjpzZWNyZXQ="))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "MicexPassportCert=token42; Domain=.moex.com; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(GROUP_58))
        .and(header("cookie", "MicexPassportCert=token42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[("A", "TQCB", 9.0)])))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = IssClient::new(&cfg).unwrap();
    let passport = authenticate(client.http(), &cfg.auth_url, "user", "secret")
        .await
        .unwrap();
    assert!(passport.is_some());

    let client = client.with_passport(passport);
    assert!(client.is_authenticated());
    let dataset = client
        .fetch_listing(&TradingMode::BoardGroup(58))
        .await
        .unwrap();
    assert_eq!(dataset.len(), 1);
}

#[tokio::test]
async fn test_passport_without_cookie_continues_anonymously() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = IssClient::new(&cfg).unwrap();
    let passport = authenticate(client.http(), &cfg.auth_url, "user", "secret")
        .await
        .unwrap();
    assert!(passport.is_none());
}

#[tokio::test]
async fn test_passport_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = IssClient::new(&cfg).unwrap();
    let err = authenticate(client.http(), &cfg.auth_url, "user", "wrong")
        .await
        .unwrap_err();
    assert!(err.is_network());
}
