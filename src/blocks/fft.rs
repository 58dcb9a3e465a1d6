//! 2-D FFT transform block
//!
//! Runs a separable 2-D transform over `Array2<Complex32>`: 1-D FFTs along every row,
//! then along every column. The inverse is scaled by `1 / (rows * cols)` so that an
//! inverse block undoes a forward block.

use crate::runtime::{Block, PortDirection, PortSchema, Step, WorkError, WorkResult};
use ndarray::{Array2, Axis};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::collections::HashMap;
use std::sync::Arc;

/// Complex 2-D array payload
pub type ComplexArray = Array2<Complex32>;

pub struct Fft2Block {
    name: String,
    direction: FftDirection,
    plans: HashMap<usize, Arc<dyn Fft<f32>>>,
}

impl Fft2Block {
    pub fn forward(name: impl Into<String>) -> Self {
        Self::new(name, FftDirection::Forward)
    }

    pub fn inverse(name: impl Into<String>) -> Self {
        Self::new(name, FftDirection::Inverse)
    }

    fn new(name: impl Into<String>, direction: FftDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            plans: HashMap::new(),
        }
    }

    pub fn direction(&self) -> FftDirection {
        self.direction
    }

    fn plan(&mut self, len: usize) -> Arc<dyn Fft<f32>> {
        let direction = self.direction;
        Arc::clone(
            self.plans
                .entry(len)
                .or_insert_with(|| FftPlanner::new().plan_fft(len, direction)),
        )
    }

    /// Transform every lane along `axis` in place
    fn transform_lanes(&mut self, array: &mut ComplexArray, axis: Axis) {
        let len = array.len_of(axis);
        let fft = self.plan(len);
        let mut buffer = vec![Complex32::new(0.0, 0.0); len];
        let mut scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        for mut lane in array.lanes_mut(axis) {
            for (slot, value) in buffer.iter_mut().zip(lane.iter()) {
                *slot = *value;
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);
            for (value, slot) in lane.iter_mut().zip(&buffer) {
                *value = *slot;
            }
        }
    }

    /// Apply the transform to one array
    pub fn apply(&mut self, mut array: ComplexArray) -> WorkResult<ComplexArray> {
        let (rows, cols) = array.dim();
        if rows == 0 || cols == 0 {
            return Err(WorkError::failed(format!(
                "cannot transform an empty {}x{} array",
                rows, cols
            )));
        }

        // Axis(1) lanes are rows, Axis(0) lanes are columns
        self.transform_lanes(&mut array, Axis(1));
        self.transform_lanes(&mut array, Axis(0));

        if self.direction == FftDirection::Inverse {
            let scale = 1.0 / (rows * cols) as f32;
            array.mapv_inplace(|value| value * scale);
        }
        Ok(array)
    }
}

impl Block<ComplexArray> for Fft2Block {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        PortSchema::numbered(PortDirection::Input, 1)
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        PortSchema::numbered(PortDirection::Output, 1)
    }

    fn step(&mut self, inputs: Vec<ComplexArray>) -> WorkResult<Step<ComplexArray>> {
        let outputs = inputs
            .into_iter()
            .map(|array| self.apply(array))
            .collect::<WorkResult<Vec<_>>>()?;
        Ok(Step::Emit(outputs))
    }
}
