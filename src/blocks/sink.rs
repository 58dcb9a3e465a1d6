//! Sink blocks

use crate::runtime::{Block, PortDirection, PortSchema, Step, WorkResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type SinkFn<T> = Box<dyn FnMut(Vec<T>) -> WorkResult<()> + Send>;

/// Hands each row of inputs to a closure and emits nothing
pub struct SinkBlock<T> {
    name: String,
    inputs: usize,
    func: SinkFn<T>,
}

impl<T: Send + 'static> SinkBlock<T> {
    pub fn new<F>(name: impl Into<String>, inputs: usize, func: F) -> Self
    where
        F: FnMut(Vec<T>) -> WorkResult<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            inputs,
            func: Box::new(func),
        }
    }

    /// Single input, infallible
    pub fn for_each<F>(name: impl Into<String>, mut func: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        Self::new(name, 1, move |row| {
            row.into_iter().for_each(&mut func);
            Ok(())
        })
    }

    /// Single input, fallible
    pub fn try_for_each<F>(name: impl Into<String>, mut func: F) -> Self
    where
        F: FnMut(T) -> WorkResult<()> + Send + 'static,
    {
        Self::new(name, 1, move |row| row.into_iter().try_for_each(&mut func))
    }
}

impl<T: Send + 'static> Block<T> for SinkBlock<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        PortSchema::numbered(PortDirection::Input, self.inputs)
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![]
    }

    fn step(&mut self, inputs: Vec<T>) -> WorkResult<Step<T>> {
        (self.func)(inputs)?;
        Ok(Step::Consumed)
    }
}

/// Items recorded by a [`CollectSink`], readable while and after the pipeline runs
#[derive(Debug)]
pub struct Collected<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Collected<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Collected<T> {
    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Move the recorded items out, leaving the record empty
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }
}

impl<T: Clone> Collected<T> {
    /// Copy of the items recorded so far, in arrival order
    pub fn items(&self) -> Vec<T> {
        self.lock().clone()
    }
}

/// Records every item it receives on `in_1`
pub struct CollectSink<T> {
    name: String,
    collected: Collected<T>,
}

impl<T: Send + 'static> CollectSink<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collected: Collected {
                items: Arc::new(Mutex::new(Vec::new())),
            },
        }
    }

    pub fn collected(&self) -> Collected<T> {
        self.collected.clone()
    }
}

impl<T: Send + 'static> Block<T> for CollectSink<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        PortSchema::numbered(PortDirection::Input, 1)
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![]
    }

    fn step(&mut self, inputs: Vec<T>) -> WorkResult<Step<T>> {
        self.collected.lock().extend(inputs);
        Ok(Step::Consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{BlockKind, WorkError};

    #[test]
    fn test_collect_sink_records_in_order() {
        let mut sink = CollectSink::new("record");
        let collected = sink.collected();
        assert_eq!(Block::<u32>::kind(&sink), BlockKind::Sink);

        sink.step(vec![3]).unwrap();
        sink.step(vec![1]).unwrap();
        assert_eq!(collected.items(), vec![3, 1]);
        assert_eq!(collected.take(), vec![3, 1]);
        assert!(collected.is_empty());
    }

    #[test]
    fn test_for_each_counts_in_block_state() {
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        let mut sink = SinkBlock::for_each("count", move |_item: u8| {
            *counter.lock().unwrap() += 1;
        });

        assert_eq!(sink.step(vec![1]).unwrap(), Step::Consumed);
        assert_eq!(sink.step(vec![2]).unwrap(), Step::Consumed);
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn test_try_for_each_error() {
        let mut sink = SinkBlock::try_for_each("strict", |item: u8| {
            if item == 0 {
                Err(WorkError::failed("zero"))
            } else {
                Ok(())
            }
        });
        assert!(sink.step(vec![1]).is_ok());
        assert_eq!(sink.step(vec![0]).unwrap_err(), WorkError::failed("zero"));
    }
}
