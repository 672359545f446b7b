//! Context enrichment demonstration.
//!
//! This example shows how a request's identity turns into the properties
//! forwarded to the remote agent:
//! 1. The gate attaches a `ClaimsLookup` to the request
//! 2. `build_context` merges verified claims into the baseline
//! 3. Requests without claims keep the baseline as-is
//!
//! Run with: `cargo run --example enrich_flow`

use std::sync::Arc;

use axum::http::Request;
use copilot_gateway::{
    build_context, Absence, AuthClaims, ClaimsLogging, ClaimsLookup, RequestProperties,
    RuntimeConfig,
};

/// Simulates a request that already passed the identity gate
fn gated_request(lookup: Option<ClaimsLookup>) -> axum::http::request::Parts {
    let mut request = Request::post("/copilotkit").body(()).unwrap();
    if let Some(lookup) = lookup {
        request.extensions_mut().insert(lookup);
    }
    request.into_parts().0
}

fn main() {
    println!("=== Context Enrichment Example ===\n");

    let runtime = Arc::new(RuntimeConfig {
        claims_logging: ClaimsLogging::Off,
        ..RuntimeConfig::default()
    });
    let baseline: Arc<RequestProperties> =
        Arc::new(RequestProperties::from_json_str(r#"{"tenant":"acme"}"#).unwrap());
    println!("Baseline: {}", serde_json::to_string(&*baseline).unwrap());

    println!("\n--- Scenario 1: Verified Session ---");
    let parts = gated_request(Some(ClaimsLookup::Present(AuthClaims::new(
        Some("user_1".to_string()),
        Some("sess_1".to_string()),
        Some("org_1".to_string()),
    ))));
    let ctx = build_context(&parts, &runtime, &baseline);
    println!("Request {}", ctx.request_id());
    println!("Properties: {}", serde_json::to_string(&**ctx.properties()).unwrap());

    println!("\n--- Scenario 2: Partial Claims ---");
    let parts = gated_request(Some(ClaimsLookup::Present(AuthClaims::new(
        Some("user_2".to_string()),
        None,
        None,
    ))));
    let ctx = build_context(&parts, &runtime, &baseline);
    println!("Properties: {}", serde_json::to_string(&**ctx.properties()).unwrap());
    println!("Missing claims become empty strings");

    println!("\n--- Scenario 3: Expired Token ---");
    let parts = gated_request(Some(ClaimsLookup::Absent(Absence::Invalid(
        "token expired".to_string(),
    ))));
    let ctx = build_context(&parts, &runtime, &baseline);
    println!("Properties: {}", serde_json::to_string(&**ctx.properties()).unwrap());
    println!("Same object as baseline: {}", Arc::ptr_eq(ctx.properties(), &baseline));

    println!("\n--- Scenario 4: Request That Skipped the Gate ---");
    let ctx = build_context(&gated_request(None), &runtime, &baseline);
    println!("Same object as baseline: {}", Arc::ptr_eq(ctx.properties(), &baseline));

    println!("\n=== Example Complete ===");
}
