//! Source block over a resumable sequence

use crate::runtime::{Block, PortDirection, PortSchema, Step, StopHandle, WorkResult};

type Generator<T> = Box<dyn FnMut() -> WorkResult<Option<T>> + Send>;

/// Emits the items of a sequence on `out_1`, one per step.
///
/// The sequence is consumed as it goes and cannot be rewound; a new source has to be
/// constructed to replay it. A raised [`StopHandle`] ends the sequence early, which
/// downstream blocks see as ordinary exhaustion.
pub struct SourceBlock<T> {
    name: String,
    generator: Generator<T>,
    stop: StopHandle,
    produced: u64,
}

impl<T: Send + 'static> SourceBlock<T> {
    /// Source over an iterator, finite or infinite.
    pub fn new<I>(name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let mut items = items.into_iter();
        Self::from_fn(name, move || Ok(items.next()))
    }

    /// Source over a fallible generator. `Ok(None)` ends the sequence.
    pub fn from_fn<F>(name: impl Into<String>, generator: F) -> Self
    where
        F: FnMut() -> WorkResult<Option<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            generator: Box::new(generator),
            stop: StopHandle::new(),
            produced: 0,
        }
    }

    /// Handle that ends the sequence at the next step
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl<T: Send + 'static> Block<T> for SourceBlock<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![]
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        PortSchema::numbered(PortDirection::Output, 1)
    }

    fn step(&mut self, _inputs: Vec<T>) -> WorkResult<Step<T>> {
        if self.stop.is_stopped() {
            return Ok(Step::Exhausted);
        }
        match (self.generator)()? {
            Some(item) => {
                self.produced += 1;
                Ok(Step::Emit(vec![item]))
            }
            None => Ok(Step::Exhausted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{BlockKind, WorkError};

    #[test]
    fn test_iterator_source() {
        let mut source = SourceBlock::new("numbers", 0..2u32);
        assert_eq!(source.kind(), BlockKind::Source);
        assert_eq!(source.output_schema()[0].name, "out_1");

        assert_eq!(source.step(vec![]).unwrap(), Step::Emit(vec![0]));
        assert_eq!(source.step(vec![]).unwrap(), Step::Emit(vec![1]));
        assert_eq!(source.step(vec![]).unwrap(), Step::Exhausted);
        assert_eq!(source.produced(), 2);
    }

    #[test]
    fn test_stop_handle_ends_infinite_source() {
        let mut source = SourceBlock::new("forever", std::iter::repeat(7u8));
        assert_eq!(source.step(vec![]).unwrap(), Step::Emit(vec![7]));

        source.stop_handle().stop();
        assert_eq!(source.step(vec![]).unwrap(), Step::Exhausted);
    }

    #[test]
    fn test_generator_error_propagates() {
        let mut calls = 0;
        let mut source = SourceBlock::from_fn("flaky", move || {
            calls += 1;
            if calls > 1 {
                Err(WorkError::failed("device unplugged"))
            } else {
                Ok(Some(calls))
            }
        });

        assert_eq!(source.step(vec![]).unwrap(), Step::Emit(vec![1]));
        assert_eq!(
            source.step(vec![]).unwrap_err(),
            WorkError::failed("device unplugged")
        );
    }
}
