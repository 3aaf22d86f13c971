//! Shared setup for chaos scenario tests.

#![allow(dead_code)]

use chaos_harness::ini::ConfigOverride;
use chaos_harness::locate::{Protocol, ServiceEndpoint};
use chaos_harness::oracle::DigOracle;
use chaos_harness::scenario::{ScenarioRunner, ScenarioSpec, ServiceSpec};
use common::config::HarnessConfig;

pub const API: &str = "api";
pub const NS_1: &str = "ns-1";
pub const NS_2: &str = "ns-2";

pub type Runner = ScenarioRunner<DigOracle, fn(&ServiceEndpoint) -> DigOracle>;

pub fn init() {
    common::telemetry::init();
}

/// The standard two-nameserver topology every scenario starts from.
pub fn standard_spec(name: &str) -> ScenarioSpec {
    ScenarioSpec {
        name: name.to_string(),
        descriptor_template: "envs/default/zone-api.yml.tmpl".to_string(),
        descriptors_before: vec!["base.yml".to_string()],
        descriptors_after: vec!["envs/default/ns.yml".to_string()],
        base_config: "envs/default/zone-api.conf".to_string(),
        overrides: Vec::new(),
        extra_params: Vec::new(),
        services: vec![
            ServiceSpec::new(API, 9001, Protocol::Http),
            ServiceSpec::new(NS_1, 53, Protocol::Udp),
            ServiceSpec::new(NS_2, 53, Protocol::Udp),
        ],
        api_unit: API.to_string(),
        nameserver_units: vec![NS_1.to_string(), NS_2.to_string()],
    }
}

pub fn spec_with_overrides(name: &str, overrides: Vec<ConfigOverride>) -> ScenarioSpec {
    ScenarioSpec {
        overrides,
        ..standard_spec(name)
    }
}

pub async fn launch(spec: ScenarioSpec) -> Runner {
    let cfg = HarnessConfig::from_env().expect("harness config loads from environment");
    let factory: fn(&ServiceEndpoint) -> DigOracle = DigOracle::new;
    ScenarioRunner::launch(cfg, spec, factory)
        .await
        .expect("environment launches - check the container engine and deploy dir")
}
