// toolhub-github/tests/client.rs
// ============================================================================
// Module: GitHub Client Tests
// Description: Validate the retry policy helpers.
// Purpose: Keep backoff, retryability, and Retry-After parsing exact.
// Dependencies: toolhub-github, reqwest
// ============================================================================

//! ## Overview
//! The retry policy is pure: retryable statuses are 429 and 5xx, backoff is
//! capped exponential with jitter, and a larger `Retry-After` wins over the
//! computed delay.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use toolhub_github::backoff_delay;
use toolhub_github::is_retryable_status;
use toolhub_github::retry_after_duration;

// ============================================================================
// SECTION: Retryability
// ============================================================================

#[test]
fn only_429_and_5xx_are_retryable() {
    assert!(is_retryable_status(429));
    assert!(is_retryable_status(500));
    assert!(is_retryable_status(503));
    assert!(is_retryable_status(599));
    assert!(!is_retryable_status(200));
    assert!(!is_retryable_status(401));
    assert!(!is_retryable_status(404));
    assert!(!is_retryable_status(422));
}

// ============================================================================
// SECTION: Backoff
// ============================================================================

#[test]
fn backoff_grows_and_caps() {
    // Jitter adds at most 200ms on top of the deterministic base.
    let first = backoff_delay(1, None);
    assert!(first >= Duration::from_millis(250));
    assert!(first < Duration::from_millis(450));

    let second = backoff_delay(2, None);
    assert!(second >= Duration::from_millis(500));
    assert!(second < Duration::from_millis(700));

    let huge = backoff_delay(30, None);
    assert!(huge >= Duration::from_secs(5));
    assert!(huge < Duration::from_millis(5_200));
}

#[test]
fn larger_retry_after_wins() {
    let delay = backoff_delay(1, Some(Duration::from_secs(9)));
    assert_eq!(delay, Duration::from_secs(9));
    // A smaller Retry-After never shrinks the computed delay.
    let delay = backoff_delay(3, Some(Duration::from_millis(1)));
    assert!(delay >= Duration::from_millis(1000));
}

// ============================================================================
// SECTION: Retry-After Parsing
// ============================================================================

#[test]
fn retry_after_parses_seconds() {
    let mut headers = HeaderMap::new();
    headers.insert("Retry-After", HeaderValue::from_static("7"));
    assert_eq!(retry_after_duration(&headers), Some(Duration::from_secs(7)));
}

#[test]
fn retry_after_ignores_absent_zero_and_garbage() {
    let headers = HeaderMap::new();
    assert_eq!(retry_after_duration(&headers), None);

    let mut zero = HeaderMap::new();
    zero.insert("Retry-After", HeaderValue::from_static("0"));
    assert_eq!(retry_after_duration(&zero), None);

    let mut negative = HeaderMap::new();
    negative.insert("Retry-After", HeaderValue::from_static("-3"));
    assert_eq!(retry_after_duration(&negative), None);

    let mut garbage = HeaderMap::new();
    garbage.insert("Retry-After", HeaderValue::from_static("soon"));
    assert_eq!(retry_after_duration(&garbage), None);
}

#[test]
fn retry_after_parses_http_dates_in_the_past_as_none() {
    let mut headers = HeaderMap::new();
    headers.insert("Retry-After", HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
    assert_eq!(retry_after_duration(&headers), None);
}
