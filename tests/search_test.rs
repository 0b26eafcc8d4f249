//! Search fan-out behavior: candidate expansion, pricing skips, and
//! per-candidate failure isolation.

mod common;

use common::*;
use rust_decimal_macros::dec;

#[tokio::test]
async fn bare_label_returns_all_six_candidates() {
    let app = TestApp::new().await;

    let results = app.search.search("mydomain").await.expect("search");

    let domains: Vec<_> = results.iter().map(|c| c.domain.as_str()).collect();
    assert_eq!(
        domains,
        vec![
            "mydomain.com",
            "mydomain.io",
            "mydomain.dj",
            "mydomain.music",
            "mydomain.live",
            "mydomain.events",
        ]
    );
    assert!(results.iter().all(|c| c.available));
    assert!(results
        .iter()
        .all(|c| c.purchase_price == Some(dec!(34.00))
            && c.renewal_price == Some(dec!(30.00))
            && c.term_years == Some(1)));
}

#[tokio::test]
async fn unavailable_candidates_carry_no_prices() {
    let app = TestApp::new().await;
    app.registrar.mark_unavailable("mydomain.com");
    app.registrar.mark_unavailable("mydomain.io");

    let results = app.search.search("mydomain").await.expect("search");
    assert_eq!(results.len(), 6);

    for candidate in &results {
        if candidate.domain.ends_with(".com") || candidate.domain.ends_with(".io") {
            assert!(!candidate.available);
            assert!(candidate.purchase_price.is_none());
            assert!(candidate.renewal_price.is_none());
            assert!(candidate.term_years.is_none());
        } else {
            assert!(candidate.available);
            assert!(candidate.purchase_price.is_some());
        }
    }
}

#[tokio::test]
async fn failing_candidate_is_dropped_without_failing_the_search() {
    let app = TestApp::new().await;
    app.registrar.mark_failing("mydomain.music");

    let results = app.search.search("mydomain").await.expect("search");
    assert_eq!(results.len(), 5);
    assert!(!results.iter().any(|c| c.domain == "mydomain.music"));
}

#[tokio::test]
async fn query_with_tld_searches_exactly_one_name() {
    let app = TestApp::new().await;

    let results = app.search.search("mydomain.dj").await.expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].domain, "mydomain.dj");
}

#[tokio::test]
async fn invalid_query_is_rejected() {
    let app = TestApp::new().await;
    assert!(app.search.search("").await.is_err());
    assert!(app.search.search("not a domain").await.is_err());
}
