//! Recording sampled states into Arrow columns.

use std::sync::{Arc, Mutex, PoisonError};

use arrow::{
    array::{ArrayBuilder, ArrayRef, Float64Builder, StructArray, UInt64Builder},
    datatypes::{DataType, Field},
};

use crate::{chain::ChainListener, graph::ModelGraph};

/// Samples every `every`-th iteration of a chain over a [`ModelGraph`].
///
/// Columns are `iteration`, `posterior` and one column per parameter
/// dimension, named after the parameter (with `[i]` appended for vectors).
pub struct TraceRecorder {
    every: u64,
    names: Vec<String>,
    iteration: UInt64Builder,
    posterior: Float64Builder,
    values: Vec<Float64Builder>,
}

impl TraceRecorder {
    pub fn new(graph: &ModelGraph, every: u64) -> Self {
        let names: Vec<String> = graph
            .parameters()
            .flat_map(|p| {
                let dim = p.dim();
                (0..dim).map(move |i| {
                    if dim == 1 {
                        p.name().to_string()
                    } else {
                        format!("{}[{}]", p.name(), i)
                    }
                })
            })
            .collect();
        Self {
            every: every.max(1),
            values: names.iter().map(|_| Float64Builder::new()).collect(),
            names,
            iteration: UInt64Builder::new(),
            posterior: Float64Builder::new(),
        }
    }

    /// Wrap the recorder so it can be handed to a chain and read back later.
    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Number of recorded draws.
    pub fn len(&self) -> usize {
        self.iteration.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = vec![
            Field::new("iteration", DataType::UInt64, false),
            Field::new("posterior", DataType::Float64, false),
        ];
        fields.extend(
            self.names
                .iter()
                .map(|name| Field::new(name, DataType::Float64, false)),
        );
        fields
    }

    pub fn finalize(mut self) -> StructArray {
        let fields = self.fields();
        let mut arrays: Vec<ArrayRef> = vec![
            ArrayBuilder::finish(&mut self.iteration),
            ArrayBuilder::finish(&mut self.posterior),
        ];
        arrays.extend(self.values.iter_mut().map(ArrayBuilder::finish));
        StructArray::new(fields.into(), arrays, None)
    }

    /// The draws so far, without consuming the recorder.
    pub fn inspect(&self) -> StructArray {
        let fields = self.fields();
        let mut arrays: Vec<ArrayRef> = vec![
            ArrayBuilder::finish_cloned(&self.iteration),
            ArrayBuilder::finish_cloned(&self.posterior),
        ];
        arrays.extend(self.values.iter().map(ArrayBuilder::finish_cloned));
        StructArray::new(fields.into(), arrays, None)
    }
}

impl ChainListener<ModelGraph> for TraceRecorder {
    fn current_state(&mut self, iteration: u64, state: &ModelGraph, score: f64) {
        if iteration % self.every != 0 {
            return;
        }
        self.iteration.append_value(iteration);
        self.posterior.append_value(score);
        let values = state.parameters().flat_map(|p| p.values().iter().copied());
        for (builder, value) in self.values.iter_mut().zip(values) {
            builder.append_value(value);
        }
    }
}

impl<S: ?Sized, L: ChainListener<S>> ChainListener<S> for Arc<Mutex<L>> {
    fn current_state(&mut self, iteration: u64, state: &S, score: f64) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current_state(iteration, state, score);
    }

    fn best_state(&mut self, iteration: u64, state: &S, score: f64) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .best_state(iteration, state, score);
    }

    fn finished(&mut self, length: u64) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished(length);
    }
}
