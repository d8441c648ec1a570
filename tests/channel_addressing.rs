//! Address plan properties across both families

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::builders::SettingsBuilder;
use proptest::prelude::*;
use rtt_plot::channel::{
    AddressFamily, AddressPlan, AddressingConfig, ChannelAddress, MAX_BASE_PORT, PORT_BLOCK_LEN,
};
use rtt_plot::orchestrator::Orchestrator;
use rtt_plot::worker::{Role, WorkerSpec};
use rtt_plot::{orchestrator::Pipeline, ShutdownFlag};

fn family() -> impl Strategy<Value = AddressFamily> {
    prop_oneof![
        Just(AddressFamily::AbstractLocal),
        Just(AddressFamily::LoopbackTcp)
    ]
}

proptest! {
    #[test]
    fn prop_eight_unique_addresses(
        family in family(),
        base_port in 1u16..=MAX_BASE_PORT,
        namespace in proptest::option::of("[a-z][a-z0-9]{0,8}"),
    ) {
        let mut config = AddressingConfig::new(family).with_base_port(base_port).unwrap();
        if let Some(ns) = namespace {
            config = config.with_namespace(ns).unwrap();
        }
        let plan = AddressPlan::compute(&config);

        let addresses = plan.addresses();
        prop_assert_eq!(addresses.len(), 8);
        let unique: HashSet<_> = addresses.iter().collect();
        prop_assert_eq!(unique.len(), 8);

        for address in addresses {
            prop_assert_eq!(address.family(), family);
            if let ChannelAddress::LoopbackTcp { port, .. } = address {
                prop_assert!(*port >= base_port && *port < base_port + PORT_BLOCK_LEN);
            }
        }
    }

    #[test]
    fn prop_plan_is_stable(family in family(), base_port in 1024u16..60000) {
        let config = AddressingConfig::new(family).with_base_port(base_port).unwrap();
        let first = AddressPlan::compute(&config);
        let second = AddressPlan::compute(&config);
        prop_assert_eq!(first.addresses(), second.addresses());
    }

    #[test]
    fn prop_base_port_past_block_limit_rejected(base_port in (MAX_BASE_PORT + 1)..=u16::MAX) {
        let config = AddressingConfig::new(AddressFamily::LoopbackTcp);
        prop_assert!(config.with_base_port(base_port).is_err());
    }
}

#[test]
fn test_hop_sets_identical_by_pointer_and_value() {
    let config = SettingsBuilder::tcp().config("hops");
    let pipeline = Pipeline::create(&config).unwrap();
    let plan = pipeline.plan();

    let mut capture_remote = None;
    let mut model_in = None;
    let mut model_remote = None;
    let mut plot_in = None;
    for worker in pipeline.workers() {
        match &worker.spec {
            WorkerSpec::CaptureTransport { remote, .. } => capture_remote = Some(remote),
            WorkerSpec::Model {
                inbound, remote, ..
            } => {
                model_in = Some(inbound);
                model_remote = Some(remote);
            }
            WorkerSpec::Presentation { inbound, .. } => plot_in = Some(inbound),
        }
    }
    let (capture_remote, model_in, model_remote, plot_in) = (
        capture_remote.unwrap(),
        model_in.unwrap(),
        model_remote.unwrap(),
        plot_in.unwrap(),
    );

    // Capture-Transport -> Model
    assert!(Arc::ptr_eq(capture_remote, model_in));
    assert!(Arc::ptr_eq(model_in, &plan.model_in));
    assert_eq!(**capture_remote, *plan.model_in);
    // Model -> Presentation
    assert!(Arc::ptr_eq(model_remote, plot_in));
    assert!(Arc::ptr_eq(plot_in, &plan.plot_in));
    assert_eq!(**model_remote, *plan.plot_in);
}

#[test]
fn test_launch_order_is_consumers_first() {
    let config = SettingsBuilder::tcp().config("order");
    let pipeline = Pipeline::create(&config).unwrap();
    let roles: Vec<Role> = pipeline.workers().iter().map(|w| w.role()).collect();
    assert_eq!(roles, vec![Role::Presentation, Role::Model, Role::CaptureTransport]);
}

#[test]
fn test_hop_survives_process_handover() {
    let config = SettingsBuilder::native("handover").config("handover");
    let pipeline = Pipeline::create(&config).unwrap();

    let decoded: Vec<_> = pipeline
        .workers()
        .iter()
        .map(|w| rtt_plot::worker::WorkerConfig::from_env_value(&w.to_env_value().unwrap()).unwrap())
        .collect();

    let capture_remote = decoded.iter().find_map(|w| match &w.spec {
        WorkerSpec::CaptureTransport { remote, .. } => Some((**remote).clone()),
        _ => None,
    });
    let model_in = decoded.iter().find_map(|w| match &w.spec {
        WorkerSpec::Model { inbound, .. } => Some((**inbound).clone()),
        _ => None,
    });
    assert_eq!(capture_remote, model_in);
    assert!(capture_remote.is_some());
}

#[test]
fn test_orchestrator_starts_idle() {
    let config = SettingsBuilder::tcp().config("idle");
    let orchestrator = Orchestrator::new(config, ShutdownFlag::new());
    assert_eq!(
        orchestrator.state(),
        rtt_plot::orchestrator::OrchestratorState::Idle
    );
}
