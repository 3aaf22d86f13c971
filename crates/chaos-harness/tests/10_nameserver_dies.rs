//! Chaos Scenarios: Nameserver Dies Mid-Operation
//!
//! A zone operation lands while one backend nameserver is unresponsive. The
//! zone must surface the degraded state, and converge once the nameserver
//! comes back.

#![cfg(feature = "scenarios")]

mod support;

use chaos_harness::scenario::FaultAction;
use common::error::Result;
use serial_test::serial;
use support::{Runner, NS_2};

/// A zone created while a nameserver is paused cannot fully propagate, so it
/// settles in ERROR. Once the nameserver resumes, the control plane retries
/// and the zone goes ACTIVE without any further API calls.
#[tokio::test]
#[serial]
async fn zone_created_while_nameserver_paused_recovers_to_active() {
    support::init();
    let mut runner = support::launch(support::standard_spec("create-while-down")).await;

    let result = create_while_down(&mut runner).await;

    let teardown = runner.teardown().await;
    result.expect("scenario");
    teardown.expect("teardown");
}

async fn create_while_down(runner: &mut Runner) -> Result<()> {
    runner.inject_fault(NS_2, FaultAction::Pause).await?;

    let zone = runner.create_zone().await?;
    runner
        .await_zone_status(&zone, &["ERROR", "ACTIVE"], "ERROR")
        .await?;

    runner.recover(NS_2, FaultAction::Resume).await?;
    runner.await_zone_status(&zone, &["ACTIVE"], "ACTIVE").await?;
    Ok(())
}

/// A delete issued while a nameserver is paused is accepted (202) but cannot
/// complete, so the zone reports ERROR. After the nameserver resumes the
/// delete finishes and the zone answers 404.
#[tokio::test]
#[serial]
async fn zone_deleted_while_nameserver_paused_eventually_disappears() {
    support::init();
    let mut runner = support::launch(support::standard_spec("delete-while-down")).await;

    let result = delete_while_down(&mut runner).await;

    let teardown = runner.teardown().await;
    result.expect("scenario");
    teardown.expect("teardown");
}

async fn delete_while_down(runner: &mut Runner) -> Result<()> {
    let zone = runner.create_zone().await?;
    runner.await_zone_status(&zone, &["ACTIVE"], "ACTIVE").await?;

    runner.inject_fault(NS_2, FaultAction::Pause).await?;
    runner.delete_zone(&zone).await?;
    runner
        .await_zone_status(&zone, &["ERROR"], "ERROR")
        .await?;

    runner.recover(NS_2, FaultAction::Resume).await?;
    runner.await_zone_gone(&zone).await?;
    Ok(())
}
