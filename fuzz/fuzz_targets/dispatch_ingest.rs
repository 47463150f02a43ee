#![no_main]

use std::time::Instant;

use libfuzzer_sys::fuzz_target;
use tally_node::config::NodeConfig;
use tally_node::dispatch::Dispatcher;
use tally_node::ledger::Ledger;
use tally_transport::adapter::InMemoryAdapter;

fuzz_target!(|data: &[u8]| {
    let dispatcher: Dispatcher<String> = Dispatcher::new(Ledger::with_seed(1), &NodeConfig::default());
    let mut adapter = InMemoryAdapter::default();
    adapter.enqueue_inbound("sender", data.to_vec());
    adapter.enqueue_inbound("sender", data.to_vec());

    let now = Instant::now();
    while dispatcher.serve_tick_at(&mut adapter, now).is_some() {}
});
