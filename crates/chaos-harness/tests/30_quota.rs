//! Chaos Scenarios: Quota Enforcement
//!
//! Quota rejections come back as structured errors, not as generic failures.
//! The scenario lowers the zone quota, fills it, and checks the shape of the
//! rejection.

#![cfg(feature = "scenarios")]

mod support;

use chaos_harness::ini::ConfigOverride;
use common::error::{HarnessError, Result};
use serial_test::serial;
use support::Runner;

const QUOTA: usize = 3;

/// Creates up to the quota succeed and go ACTIVE; the create after that is
/// rejected with 413 and an `over_quota` error payload.
#[tokio::test]
#[serial]
async fn zone_create_over_quota_is_rejected_with_over_quota() {
    support::init();
    let spec = support::spec_with_overrides(
        "quota",
        vec![ConfigOverride::new(
            "DEFAULT",
            "quota_zones",
            QUOTA.to_string(),
        )],
    );
    let mut runner = support::launch(spec).await;

    let result = fill_quota_then_overflow(&mut runner).await;

    let teardown = runner.teardown().await;
    result.expect("scenario");
    teardown.expect("teardown");
}

async fn fill_quota_then_overflow(runner: &mut Runner) -> Result<()> {
    for _ in 0..QUOTA {
        let zone = runner.create_zone().await?;
        runner.await_zone_status(&zone, &["ACTIVE"], "ACTIVE").await?;
    }

    // One past the quota: the API must reject, and must say why.
    let resp = runner
        .api()?
        .create_zone(
            &common::naming::random_zone(),
            "hostmaster@example.com",
        )
        .await
        .map_err(|e| HarnessError::Probe(e.to_string()))?;

    if resp.status != 413 {
        return Err(HarnessError::Assertion(format!(
            "expected 413 past the quota, got {}",
            resp.summary()
        )));
    }
    if resp.code() != Some(413) {
        return Err(HarnessError::Assertion(format!(
            "rejection body has the wrong code: {}",
            resp.summary()
        )));
    }
    if resp.error_type() != Some("over_quota") {
        return Err(HarnessError::Assertion(format!(
            "rejection body has the wrong type: {}",
            resp.summary()
        )));
    }
    Ok(())
}
