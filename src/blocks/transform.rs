//! Closure-backed transform block

use crate::runtime::{Block, PortDirection, PortSchema, Step, WorkResult};

type TransformFn<T> = Box<dyn FnMut(Vec<T>) -> WorkResult<Vec<T>> + Send>;

/// Applies a function to each row of inputs.
///
/// The function gets one item per input port (`in_1..in_N`, in order) and returns one
/// item per output port (`out_1..out_M`), or nothing at all to consume the row
/// without emitting.
pub struct TransformBlock<T> {
    name: String,
    inputs: usize,
    outputs: usize,
    discardable: Vec<bool>,
    func: TransformFn<T>,
}

impl<T: Send + 'static> TransformBlock<T> {
    pub fn new<F>(name: impl Into<String>, inputs: usize, outputs: usize, func: F) -> Self
    where
        F: FnMut(Vec<T>) -> WorkResult<Vec<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            inputs,
            outputs,
            discardable: vec![false; outputs],
            func: Box::new(func),
        }
    }

    /// One input, one output
    pub fn map<F>(name: impl Into<String>, mut func: F) -> Self
    where
        F: FnMut(T) -> T + Send + 'static,
    {
        Self::new(name, 1, 1, move |row| Ok(row.into_iter().map(&mut func).collect()))
    }

    /// One input, one output, fallible
    pub fn try_map<F>(name: impl Into<String>, mut func: F) -> Self
    where
        F: FnMut(T) -> WorkResult<T> + Send + 'static,
    {
        Self::new(name, 1, 1, move |row| row.into_iter().map(&mut func).collect())
    }

    pub fn identity(name: impl Into<String>) -> Self {
        Self::map(name, |item| item)
    }

    /// Let output `port` (1-based, as in `out_1`) stay unmapped.
    pub fn with_discardable_output(mut self, port: usize) -> Self {
        if let Some(flag) = port.checked_sub(1).and_then(|i| self.discardable.get_mut(i)) {
            *flag = true;
        }
        self
    }
}

impl<T: Send + 'static> Block<T> for TransformBlock<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        PortSchema::numbered(PortDirection::Input, self.inputs)
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        PortSchema::numbered(PortDirection::Output, self.outputs)
            .into_iter()
            .zip(&self.discardable)
            .map(|(schema, &discardable)| {
                if discardable {
                    schema.discardable()
                } else {
                    schema
                }
            })
            .collect()
    }

    fn step(&mut self, inputs: Vec<T>) -> WorkResult<Step<T>> {
        let items = (self.func)(inputs)?;
        if items.is_empty() {
            Ok(Step::Consumed)
        } else {
            Ok(Step::Emit(items))
        }
    }
}
