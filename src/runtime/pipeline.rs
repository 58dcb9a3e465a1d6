//! Pipeline builder for constructing block graphs
//!
//! A pipeline is an ordered list of blocks, each paired with a [`PortMap`] that binds
//! its port names to channel keys. Port mappings are checked as blocks are added;
//! the graph as a whole (unbound inputs, cycles, capacities) is checked by
//! [`Pipeline::validate`], which `build` and `run` call before any data moves.

use super::block::Block;
use super::channel::{ChannelKey, wired};
use super::config::{ExecutionMode, PipelineConfig};
use super::cooperative::run_cooperative;
use super::errors::PipelineError;
use super::graph::{ChannelGraph, Endpoint};
use super::ports::{PortDirection, PortMap, PortSchema};
use super::receiver::Receiver;
use super::report::RunReport;
use super::scheduler::Scheduler;
use super::sender::Sender;
use super::signal::{Signal, StopHandle};
use super::watchdog::Watchdog;
use super::worker::BlockWorker;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

struct Entry<T> {
    block: Box<dyn Block<T>>,
    name: String,
    input_ports: Vec<String>,
    input_keys: Vec<ChannelKey>,
    output_keys: Vec<Option<ChannelKey>>,
}

/// Pipeline builder that owns blocks and their channel bindings
pub struct Pipeline<T> {
    entries: Vec<Entry<T>>,
    graph: ChannelGraph,
    config: PipelineConfig,
    stop: Signal,
}

impl<T: Clone + Send + 'static> Pipeline<T> {
    /// Create an empty pipeline with the default configuration
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            graph: ChannelGraph::new(),
            config: PipelineConfig::default(),
            stop: Signal::new(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a pipeline from (block, mapping) entries, in order
    pub fn from_entries<I>(entries: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = (Box<dyn Block<T>>, PortMap)>,
    {
        let mut pipeline = Self::new();
        for (block, ports) in entries {
            pipeline.add_boxed(block, ports)?;
        }
        Ok(pipeline)
    }

    /// Add a block with its port mapping
    pub fn add<B: Block<T> + 'static>(
        &mut self,
        block: B,
        ports: PortMap,
    ) -> Result<&mut Self, PipelineError> {
        self.add_boxed(Box::new(block), ports)
    }

    pub fn add_boxed(
        &mut self,
        block: Box<dyn Block<T>>,
        ports: PortMap,
    ) -> Result<&mut Self, PipelineError> {
        let index = self.entries.len();
        let name = block.name().to_string();
        let inputs = block.input_schema();
        let outputs = block.output_schema();

        check_schema(&name, &inputs, &outputs)?;

        if let Some((port, _)) = ports
            .iter()
            .find(|(port, _)| !inputs.iter().chain(&outputs).any(|s| s.name == *port))
        {
            return Err(PipelineError::UnknownPort {
                block: name,
                port: port.to_string(),
            });
        }

        let input_keys = inputs
            .iter()
            .map(|schema| {
                ports
                    .get(&schema.name)
                    .ok_or_else(|| PipelineError::PortMapping {
                        block: name.clone(),
                        port: schema.name.clone(),
                        direction: PortDirection::Input,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output_keys = outputs
            .iter()
            .map(|schema| match ports.get(&schema.name) {
                Some(key) => Ok(Some(key)),
                None if schema.discardable => Ok(None),
                None => Err(PipelineError::PortMapping {
                    block: name.clone(),
                    port: schema.name.clone(),
                    direction: PortDirection::Output,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Single producer per key, checked before anything is recorded
        let mut claimed = HashSet::new();
        for &key in output_keys.iter().flatten() {
            if let Some(existing) = self.graph.producer(key) {
                return Err(PipelineError::DuplicateProducer {
                    key,
                    first: self.entries[existing.block].name.clone(),
                    second: name,
                });
            }
            if !claimed.insert(key) {
                return Err(PipelineError::DuplicateProducer {
                    key,
                    first: name.clone(),
                    second: name,
                });
            }
        }

        for (port, key) in output_keys.iter().enumerate() {
            if let Some(key) = *key {
                self.graph.set_producer(key, Endpoint::new(index, port));
            }
        }
        for (port, &key) in input_keys.iter().enumerate() {
            self.graph.add_consumer(key, Endpoint::new(index, port));
        }

        debug!(
            "Added block #{} '{}' ({} inputs, {} outputs)",
            index,
            name,
            input_keys.len(),
            output_keys.len()
        );

        self.entries.push(Entry {
            block,
            name,
            input_ports: inputs.into_iter().map(|s| s.name).collect(),
            input_keys,
            output_keys,
        });
        Ok(self)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn graph(&self) -> &ChannelGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Block names in entry order
    pub fn block_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Handle that makes every source exhaust on its next step
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::from_signal(self.stop.clone())
    }

    /// Check the graph without running it
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.execution_order().map(|_| ())
    }

    fn execution_order(&self) -> Result<Vec<usize>, PipelineError> {
        if let Some((key, endpoint)) = self.graph.unbound().into_iter().next() {
            let entry = &self.entries[endpoint.block];
            return Err(PipelineError::UnboundChannel {
                key,
                block: entry.name.clone(),
                port: entry.input_ports[endpoint.port].clone(),
            });
        }

        for channel in self.graph.channels() {
            let capacity = self.config.capacity_for(channel.key);
            if capacity == 0 {
                return Err(PipelineError::InvalidCapacity {
                    key: channel.key,
                    capacity,
                });
            }
        }

        let order = self
            .graph
            .execution_order(self.entries.len())
            .map_err(|block| PipelineError::Cycle {
                block: self.entries[block].name.clone(),
            })?;

        for key in self.graph.dangling() {
            warn!("Channel {} has no readers; its items will be dropped", key);
        }

        Ok(order)
    }

    /// Validate, then start every block on its own thread
    pub fn build(self) -> Result<Scheduler, PipelineError> {
        self.execution_order()?;

        info!(
            "Building pipeline with {} blocks and {} channels",
            self.entries.len(),
            self.graph.len()
        );

        let abort = Signal::new();
        let watchdog = self.config.watchdog_threshold().map(Watchdog::new);
        let stop = self.stop.clone();
        let workers = self.into_workers(&abort, watchdog.as_ref())?;

        let mut scheduler = Scheduler::new(stop, abort, watchdog);
        for worker in workers {
            scheduler.start_block(worker);
        }

        info!(
            "Pipeline built successfully with {} threads",
            scheduler.num_threads()
        );
        Ok(scheduler)
    }

    /// Drive every block to completion with the configured execution mode
    pub fn run(self) -> Result<RunReport, PipelineError> {
        match self.config.mode() {
            ExecutionMode::Threaded => self.build()?.wait(),
            ExecutionMode::Cooperative => {
                let order = self.execution_order()?;
                info!(
                    "Building cooperative pipeline with {} blocks and {} channels",
                    self.entries.len(),
                    self.graph.len()
                );
                let workers = self.into_workers(&Signal::new(), None)?;
                run_cooperative(workers, &order)
            }
        }
    }

    /// Create every channel and hand each block its endpoints
    fn into_workers(
        self,
        abort: &Signal,
        watchdog: Option<&Watchdog>,
    ) -> Result<Vec<BlockWorker<T>>, PipelineError> {
        let Pipeline {
            entries,
            graph,
            config,
            stop,
        } = self;

        let mut readers: HashMap<Endpoint, Receiver<T>> = HashMap::new();
        let mut writers: HashMap<Endpoint, Sender<T>> = HashMap::new();

        for channel in graph.channels() {
            let (sender, receivers) = wired(
                channel.key,
                config.capacity_for(channel.key),
                channel.consumers.len(),
                abort.clone(),
                config.poll_interval(),
            );

            for (&endpoint, receiver) in channel.consumers.iter().zip(receivers) {
                let receiver = match watchdog {
                    Some(watchdog) => receiver.with_watchdog(watchdog.register(
                        &entries[endpoint.block].name,
                        "get",
                        channel.key,
                    )),
                    None => receiver,
                };
                readers.insert(endpoint, receiver);
            }

            if let Some(producer) = channel.producer {
                let sender = match watchdog {
                    Some(watchdog) => sender.with_watchdog(watchdog.register(
                        &entries[producer.block].name,
                        "put",
                        channel.key,
                    )),
                    None => sender,
                };
                writers.insert(producer, sender);
            }
        }

        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let inputs = entry
                    .input_keys
                    .iter()
                    .enumerate()
                    .map(|(port, &key)| {
                        readers.remove(&Endpoint::new(index, port)).ok_or_else(|| {
                            PipelineError::UnboundChannel {
                                key,
                                block: entry.name.clone(),
                                port: entry.input_ports[port].clone(),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                let outputs = (0..entry.output_keys.len())
                    .map(|port| writers.remove(&Endpoint::new(index, port)))
                    .collect();

                Ok(BlockWorker::new(
                    index,
                    entry.block,
                    inputs,
                    outputs,
                    stop.clone(),
                ))
            })
            .collect()
    }
}

impl<T: Clone + Send + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Port names must be unique across both directions of a block
fn check_schema(
    block: &str,
    inputs: &[PortSchema],
    outputs: &[PortSchema],
) -> Result<(), PipelineError> {
    let mut seen = HashSet::new();
    for schema in inputs.iter().chain(outputs) {
        if !seen.insert(schema.name.as_str()) {
            return Err(PipelineError::InvalidSchema {
                block: block.to_string(),
                port: schema.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{CollectSink, SinkBlock, SourceBlock, TransformBlock};
    use crate::runtime::block::{Step, WorkError, WorkResult};
    use crate::runtime::report::BlockOutcome;
    use crate::runtime::BlockKind;
    use std::time::{Duration, Instant};

    const MODES: [ExecutionMode; 2] = [ExecutionMode::Threaded, ExecutionMode::Cooperative];

    fn config(mode: ExecutionMode) -> PipelineConfig {
        PipelineConfig::new()
            .with_mode(mode)
            .with_poll_interval(Duration::from_millis(5))
            .without_watchdog()
    }

    fn ports<const N: usize>(bindings: [(&str, ChannelKey); N]) -> PortMap {
        PortMap::from(bindings)
    }

    struct TwoInputs;

    impl Block<u32> for TwoInputs {
        fn name(&self) -> &str {
            "two_inputs"
        }

        fn input_schema(&self) -> Vec<PortSchema> {
            PortSchema::numbered(PortDirection::Input, 2)
        }

        fn output_schema(&self) -> Vec<PortSchema> {
            vec![]
        }

        fn step(&mut self, _inputs: Vec<u32>) -> WorkResult<Step<u32>> {
            Ok(Step::Consumed)
        }
    }

    struct DuplicatePorts;

    impl Block<u32> for DuplicatePorts {
        fn name(&self) -> &str {
            "duplicate_ports"
        }

        fn input_schema(&self) -> Vec<PortSchema> {
            vec![PortSchema::input("x", 0)]
        }

        fn output_schema(&self) -> Vec<PortSchema> {
            vec![PortSchema::output("x", 0)]
        }

        fn step(&mut self, inputs: Vec<u32>) -> WorkResult<Step<u32>> {
            Ok(Step::Emit(inputs))
        }
    }

    #[test]
    fn test_missing_input_mapping_fails_construction() {
        let mut pipeline = Pipeline::<u32>::new();
        pipeline
            .add(SourceBlock::new("source", 0..3), ports([("out_1", 0)]))
            .unwrap();

        let err = pipeline
            .add(TwoInputs, ports([("in_1", 0)]))
            .err()
            .unwrap();
        assert_eq!(
            err,
            PipelineError::PortMapping {
                block: "two_inputs".to_string(),
                port: "in_2".to_string(),
                direction: PortDirection::Input,
            }
        );
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_from_entries_stops_at_first_bad_entry() {
        let entries: Vec<(Box<dyn Block<u32>>, PortMap)> = vec![
            (Box::new(SourceBlock::new("source", 0..3)), ports([("out_1", 0)])),
            (Box::new(TwoInputs), ports([("in_1", 0)])),
        ];
        assert!(matches!(
            Pipeline::from_entries(entries),
            Err(PipelineError::PortMapping { .. })
        ));
    }

    #[test]
    fn test_missing_output_mapping_unless_discardable() {
        let mut pipeline = Pipeline::<u32>::new();
        let err = pipeline
            .add(TransformBlock::identity("strict"), ports([("in_1", 0)]))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PipelineError::PortMapping {
                direction: PortDirection::Output,
                ..
            }
        ));

        pipeline
            .add(
                TransformBlock::identity("lenient").with_discardable_output(1),
                ports([("in_1", 0)]),
            )
            .unwrap();
    }

    #[test]
    fn test_unknown_port_rejected() {
        let mut pipeline = Pipeline::<u32>::new();
        let err = pipeline
            .add(
                SourceBlock::new("source", 0..3),
                ports([("out_1", 0), ("out_2", 1)]),
            )
            .err()
            .unwrap();
        assert_eq!(
            err,
            PipelineError::UnknownPort {
                block: "source".to_string(),
                port: "out_2".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_port_names_rejected() {
        let mut pipeline = Pipeline::<u32>::new();
        let err = pipeline
            .add(DuplicatePorts, ports([("x", 0)]))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidSchema { .. }));
    }

    #[test]
    fn test_duplicate_producer_rejected() {
        let mut pipeline = Pipeline::<u32>::new();
        pipeline
            .add(SourceBlock::new("first", 0..3), ports([("out_1", 4)]))
            .unwrap();
        let err = pipeline
            .add(SourceBlock::new("second", 0..3), ports([("out_1", 4)]))
            .err()
            .unwrap();
        assert_eq!(
            err,
            PipelineError::DuplicateProducer {
                key: 4,
                first: "first".to_string(),
                second: "second".to_string(),
            }
        );

        let err = pipeline
            .add(
                TransformBlock::new("split", 1, 2, |row: Vec<u32>| Ok(vec![row[0]; 2])),
                ports([("in_1", 4), ("out_1", 5), ("out_2", 5)]),
            )
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::DuplicateProducer { key: 5, .. }));
    }

    #[test]
    fn test_unbound_channel_fails_validation() {
        let mut pipeline = Pipeline::<u32>::new();
        pipeline
            .add(CollectSink::new("sink"), ports([("in_1", 9)]))
            .unwrap();

        let expected = PipelineError::UnboundChannel {
            key: 9,
            block: "sink".to_string(),
            port: "in_1".to_string(),
        };
        assert_eq!(pipeline.validate().unwrap_err(), expected);
        assert_eq!(pipeline.run().unwrap_err(), expected);
    }

    #[test]
    fn test_cycle_fails_validation() {
        let mut pipeline = Pipeline::<u32>::new();
        pipeline
            .add(TransformBlock::identity("a"), ports([("in_1", 0), ("out_1", 1)]))
            .unwrap();
        pipeline
            .add(TransformBlock::identity("b"), ports([("in_1", 1), ("out_1", 0)]))
            .unwrap();
        assert!(matches!(
            pipeline.validate(),
            Err(PipelineError::Cycle { .. })
        ));
    }

    #[test]
    fn test_zero_capacity_fails_validation() {
        let mut pipeline =
            Pipeline::<u32>::new().with_config(PipelineConfig::new().with_capacity(0, 0));
        pipeline
            .add(SourceBlock::new("source", 0..3), ports([("out_1", 0)]))
            .unwrap();
        pipeline
            .add(CollectSink::new("sink"), ports([("in_1", 0)]))
            .unwrap();
        assert_eq!(
            pipeline.validate().unwrap_err(),
            PipelineError::InvalidCapacity { key: 0, capacity: 0 }
        );
    }

    #[test]
    fn test_round_trip_identity() {
        for mode in MODES {
            let sink = CollectSink::new("record");
            let collected = sink.collected();

            let mut pipeline = Pipeline::<i64>::new().with_config(config(mode));
            pipeline
                .add(SourceBlock::new("source", [42]), ports([("out_1", 0)]))
                .unwrap()
                .add(TransformBlock::map("f", |x: i64| x * 3 + 1), ports([("in_1", 0), ("out_1", 1)]))
                .unwrap()
                .add(
                    TransformBlock::map("f_inv", |x: i64| (x - 1) / 3),
                    ports([("in_1", 1), ("out_1", 2)]),
                )
                .unwrap()
                .add(sink, ports([("in_1", 2)]))
                .unwrap();

            pipeline.run().unwrap();
            assert_eq!(collected.items(), vec![42], "mode {:?}", mode);
        }
    }

    #[test]
    fn test_chain_of_identity_stages() {
        const STAGES: usize = 6;

        for mode in MODES {
            let sink = CollectSink::new("sink");
            let collected = sink.collected();

            let mut pipeline =
                Pipeline::<u32>::new().with_config(config(mode).with_default_capacity(2));
            pipeline
                .add(SourceBlock::new("source", 0..10), ports([("out_1", 0)]))
                .unwrap();
            for i in 0..STAGES {
                pipeline
                    .add(
                        TransformBlock::identity(format!("stage_{}", i)),
                        ports([("in_1", i), ("out_1", i + 1)]),
                    )
                    .unwrap();
            }
            pipeline.add(sink, ports([("in_1", STAGES)])).unwrap();

            let report = pipeline.run().unwrap();
            assert_eq!(collected.items(), (0..10).collect::<Vec<_>>());
            assert_eq!(report.steps_for(BlockKind::Transform), (STAGES * 10) as u64);
            assert!(
                report
                    .blocks()
                    .iter()
                    .all(|b| b.outcome == BlockOutcome::Exhausted)
            );
        }
    }

    #[test]
    fn test_exhaustion_reaches_every_downstream_block() {
        const K: u32 = 25;

        for mode in MODES {
            let left = CollectSink::new("left");
            let right = CollectSink::new("right");
            let (left_items, right_items) = (left.collected(), right.collected());

            let mut pipeline =
                Pipeline::<u32>::new().with_config(config(mode).with_default_capacity(1));
            pipeline
                .add(SourceBlock::new("source", 0..K), ports([("out_1", 0)]))
                .unwrap()
                .add(TransformBlock::map("inc", |x: u32| x + 1), ports([("in_1", 0), ("out_1", 1)]))
                .unwrap()
                .add(left, ports([("in_1", 1)]))
                .unwrap()
                .add(right, ports([("in_1", 0)]))
                .unwrap();

            let report = pipeline.run().unwrap();
            for name in ["source", "inc", "left", "right"] {
                let block = report.block(name).unwrap();
                assert_eq!(block.steps, K as u64, "{} in {:?}", name, mode);
                assert_eq!(block.outcome, BlockOutcome::Exhausted);
            }
            assert_eq!(left_items.items(), (1..=K).collect::<Vec<_>>());
            assert_eq!(right_items.items(), (0..K).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_fan_in_pairs_items_by_position() {
        for mode in MODES {
            let sink = CollectSink::new("pairs");
            let collected = sink.collected();

            let mut pipeline = Pipeline::<u32>::new().with_config(config(mode));
            pipeline
                .add(SourceBlock::new("tens", (0..8).map(|i| i * 10)), ports([("out_1", 0)]))
                .unwrap()
                .add(SourceBlock::new("ones", 0..5), ports([("out_1", 1)]))
                .unwrap()
                .add(
                    TransformBlock::new("zip", 2, 1, |row: Vec<u32>| Ok(vec![row[0] + row[1]])),
                    ports([("in_1", 0), ("in_2", 1), ("out_1", 2)]),
                )
                .unwrap()
                .add(sink, ports([("in_1", 2)]))
                .unwrap();

            let report = pipeline.run().unwrap();
            assert_eq!(collected.items(), vec![0, 11, 22, 33, 44]);
            assert_eq!(report.block("zip").unwrap().steps, 5);
        }
    }

    #[test]
    fn test_discarded_output_and_dangling_channel() {
        for mode in MODES {
            let sink = CollectSink::new("evens");
            let collected = sink.collected();

            let mut pipeline = Pipeline::<u32>::new().with_config(config(mode));
            pipeline
                .add(SourceBlock::new("source", 0..6), ports([("out_1", 0)]))
                .unwrap()
                .add(
                    TransformBlock::new("split", 1, 3, |row: Vec<u32>| {
                        Ok(vec![row[0] * 2, row[0] * 2 + 1, row[0]])
                    })
                    .with_discardable_output(3),
                    ports([("in_1", 0), ("out_1", 1), ("out_2", 2)]),
                )
                .unwrap()
                .add(sink, ports([("in_1", 1)]))
                .unwrap();

            pipeline.validate().unwrap();
            pipeline.run().unwrap();
            assert_eq!(collected.items(), vec![0, 2, 4, 6, 8, 10]);
        }
    }

    #[test]
    fn test_stage_error_stops_run() {
        for mode in MODES {
            let mut pipeline =
                Pipeline::<u32>::new().with_config(config(mode).with_default_capacity(1));
            pipeline
                .add(SourceBlock::new("source", 0..), ports([("out_1", 0)]))
                .unwrap()
                .add(
                    TransformBlock::try_map("check", |x: u32| {
                        if x == 7 {
                            Err(WorkError::failed("seven"))
                        } else {
                            Ok(x)
                        }
                    }),
                    ports([("in_1", 0), ("out_1", 1)]),
                )
                .unwrap()
                .add(SinkBlock::for_each("sink", |_x: u32| {}), ports([("in_1", 1)]))
                .unwrap();

            let start = Instant::now();
            let err = pipeline.run().unwrap_err();
            assert!(start.elapsed() < Duration::from_secs(5));
            assert_eq!(
                err,
                PipelineError::StageExecution {
                    block: "check".to_string(),
                    source: WorkError::failed("seven"),
                }
            );
        }
    }

    #[test]
    fn test_panicking_stage_is_reported() {
        for mode in MODES {
            let mut pipeline = Pipeline::<u32>::new().with_config(config(mode));
            pipeline
                .add(SourceBlock::new("source", 0..100), ports([("out_1", 0)]))
                .unwrap()
                .add(
                    SinkBlock::for_each("fragile", |x: u32| {
                        if x == 3 {
                            panic!("cannot handle three");
                        }
                    }),
                    ports([("in_1", 0)]),
                )
                .unwrap();

            match pipeline.run() {
                Err(PipelineError::StageExecution {
                    block,
                    source: WorkError::Panicked(message),
                }) => {
                    assert_eq!(block, "fragile");
                    assert!(message.contains("three"));
                }
                other => panic!("unexpected result in {:?}: {:?}", mode, other),
            }
        }
    }

    #[test]
    fn test_wrong_emit_arity_is_stage_error() {
        let mut pipeline = Pipeline::<u32>::new().with_config(config(ExecutionMode::Threaded));
        pipeline
            .add(SourceBlock::new("source", 0..3), ports([("out_1", 0)]))
            .unwrap()
            .add(
                TransformBlock::new("greedy", 1, 1, |row: Vec<u32>| Ok(vec![row[0], row[0]])),
                ports([("in_1", 0), ("out_1", 1)]),
            )
            .unwrap()
            .add(CollectSink::new("sink"), ports([("in_1", 1)]))
            .unwrap();

        assert!(matches!(
            pipeline.run(),
            Err(PipelineError::StageExecution {
                source: WorkError::Arity { expected: 1, got: 2 },
                ..
            })
        ));
    }

    #[test]
    fn test_stop_handle_ends_infinite_source() {
        let sink = CollectSink::new("sink");
        let collected = sink.collected();

        let mut pipeline = Pipeline::<u64>::new().with_config(config(ExecutionMode::Threaded));
        pipeline
            .add(SourceBlock::new("forever", 0..), ports([("out_1", 0)]))
            .unwrap()
            .add(sink, ports([("in_1", 0)]))
            .unwrap();

        let stop = pipeline.stop_handle();
        let scheduler = pipeline.build().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        stop.stop();

        let report = scheduler.wait().unwrap();
        let items = collected.items();
        assert!(!items.is_empty());
        assert_eq!(items, (0..items.len() as u64).collect::<Vec<_>>());
        assert_eq!(report.block("sink").unwrap().steps, items.len() as u64);
    }

    #[test]
    fn test_cooperative_stop_from_inside_a_block() {
        let mut pipeline = Pipeline::<u64>::new().with_config(config(ExecutionMode::Cooperative));
        let stop = pipeline.stop_handle();
        pipeline
            .add(SourceBlock::new("forever", 0..), ports([("out_1", 0)]))
            .unwrap()
            .add(
                SinkBlock::for_each("watcher", move |x: u64| {
                    if x == 20 {
                        stop.stop();
                    }
                }),
                ports([("in_1", 0)]),
            )
            .unwrap();

        let report = pipeline.run().unwrap();
        assert!(report.block("watcher").unwrap().steps >= 21);
    }

    #[test]
    fn test_short_consumer_abandons_producer() {
        for mode in MODES {
            let mut pipeline = Pipeline::<u32>::new().with_config(config(mode));
            pipeline
                .add(SourceBlock::new("forever", 0..), ports([("out_1", 0)]))
                .unwrap()
                .add(SourceBlock::new("three", 0..3), ports([("out_1", 1)]))
                .unwrap()
                .add(
                    TransformBlock::new("zip", 2, 1, |row: Vec<u32>| Ok(vec![row[0] + row[1]])),
                    ports([("in_1", 0), ("in_2", 1), ("out_1", 2)]),
                )
                .unwrap()
                .add(CollectSink::new("sink"), ports([("in_1", 2)]))
                .unwrap();

            let report = pipeline.run().unwrap();
            assert_eq!(report.block("zip").unwrap().steps, 3);
            assert_eq!(
                report.block("forever").unwrap().outcome,
                BlockOutcome::Abandoned
            );
        }
    }

    struct EchoSink;

    impl Block<u32> for EchoSink {
        fn name(&self) -> &str {
            "echo"
        }

        fn input_schema(&self) -> Vec<PortSchema> {
            PortSchema::numbered(PortDirection::Input, 1)
        }

        fn output_schema(&self) -> Vec<PortSchema> {
            vec![]
        }

        fn step(&mut self, inputs: Vec<u32>) -> WorkResult<Step<u32>> {
            Ok(Step::Emit(inputs))
        }
    }

    #[test]
    fn test_sink_returning_emit_completes() {
        for mode in MODES {
            let mut pipeline = Pipeline::<u32>::new().with_config(config(mode));
            pipeline
                .add(SourceBlock::new("src", 0..3), ports([("out_1", 0)]))
                .unwrap()
                .add(EchoSink, ports([("in_1", 0)]))
                .unwrap();

            let report = pipeline.run().unwrap();
            let echo = report.block("echo").unwrap();
            assert_eq!(echo.steps, 3, "mode {:?}", mode);
            assert_eq!(echo.outcome, BlockOutcome::Exhausted);
        }
    }

    #[test]
    fn test_held_sink_backpressures_source() {
        use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
        use std::sync::{Arc, Mutex};

        let pulled = Arc::new(AtomicU32::new(0));
        let released = Arc::new(AtomicBool::new(false));
        let received = Arc::new(Mutex::new(Vec::new()));

        let generator = {
            let pulled = Arc::clone(&pulled);
            move || -> WorkResult<Option<u32>> {
                let next = pulled.load(Ordering::SeqCst);
                if next == 10 {
                    return Ok(None);
                }
                pulled.store(next + 1, Ordering::SeqCst);
                Ok(Some(next))
            }
        };
        let hold = {
            let released = Arc::clone(&released);
            let received = Arc::clone(&received);
            move |x: u32| {
                while !released.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                received.lock().unwrap().push(x);
            }
        };

        let mut pipeline = Pipeline::<u32>::new()
            .with_config(config(ExecutionMode::Threaded).with_capacity(0, 1));
        pipeline
            .add(SourceBlock::from_fn("source", generator), ports([("out_1", 0)]))
            .unwrap()
            .add(SinkBlock::for_each("held", hold), ports([("in_1", 0)]))
            .unwrap();
        let scheduler = pipeline.build().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        // At most one item held by the sink, one buffered and one waiting in put
        let in_flight = pulled.load(Ordering::SeqCst);
        assert!((1..=3).contains(&in_flight), "source pulled {}", in_flight);

        released.store(true, Ordering::SeqCst);
        let report = scheduler.wait().unwrap();
        assert_eq!(*received.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(report.block("source").unwrap().emitted, 10);
    }
}
