// ============================================================
// Layer 5 — Recurrent Cells
// ============================================================
// The encoder and decoder both run on a stack of recurrent cells
// that is stepped one time step at a time. Three variants are
// supported, selected by configuration at model construction:
//
//   Gru          — basic gated cell, hidden state only
//   Lstm         — gated cell with a separate memory cell
//                  (forget-gate bias 1.0, the usual trick to keep
//                  the memory path open early in training)
//   LayerNormLstm — LSTM with layer normalisation on each gate
//                  block and on the new memory
//
// The SequenceCell trait is the capability interface:
//   zero_state(batch) → initial state
//   step(state, input) → (new_state, output)
//
// Every variant is a burn Module so its parameters are picked up
// by the optimiser and the checkpoint recorder automatically.
//
// Reference: Cho et al. (2014) GRU, Hochreiter & Schmidhuber (1997)
//            LSTM, Ba et al. (2016) Layer Normalization

use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::sigmoid,
};
use serde::{Deserialize, Serialize};

// ─── Cell selection ───────────────────────────────────────────────────────────
/// Which recurrent cell variant to build. Stored in the model config
/// so a checkpoint can be rebuilt with the same architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Gru,
    Lstm,
    LayerNormLstm,
}

/// Parse from the CLI spelling: "gru", "lstm", "layer-norm-lstm".
impl std::str::FromStr for CellKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gru" => Ok(Self::Gru),
            "lstm" => Ok(Self::Lstm),
            "layer-norm-lstm" | "lnlstm" => Ok(Self::LayerNormLstm),
            other => Err(format!(
                "unknown cell '{other}' (expected gru, lstm or layer-norm-lstm)"
            )),
        }
    }
}

// ─── Cell state ───────────────────────────────────────────────────────────────
/// The loop-carried state of one cell for one batch.
///
/// `hidden` is always present; `memory` exists only for the LSTM
/// variants. Both are `[batch, state_size]`.
#[derive(Debug, Clone)]
pub struct CellState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub memory: Option<Tensor<B, 2>>,
}

impl<B: Backend> CellState<B> {
    /// Elementwise select between a stepped state and the previous one.
    ///
    /// `active` is `[batch, 1]` with 1.0 where the sequence is still
    /// running and 0.0 where it has finished. Finished sequences keep
    /// their old state, so stepping past a sequence's true length can
    /// never corrupt its final state.
    pub fn select(self, previous: CellState<B>, active: Tensor<B, 2>) -> CellState<B> {
        let keep = active.ones_like() - active.clone();
        let hidden = self.hidden * active.clone() + previous.hidden * keep.clone();
        let memory = match (self.memory, previous.memory) {
            (Some(stepped), Some(prev)) => Some(stepped * active + prev * keep),
            _ => None,
        };
        CellState { hidden, memory }
    }
}

// ─── Capability interface ─────────────────────────────────────────────────────
/// One recurrent step: consume a state and an input column, produce
/// the next state and the cell output for this time step.
pub trait SequenceCell<B: Backend> {
    fn zero_state(&self, batch_size: usize, device: &B::Device) -> CellState<B>;
    fn step(&self, state: CellState<B>, input: Tensor<B, 2>) -> (CellState<B>, Tensor<B, 2>);
}

// ─── GRU ──────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    /// Update and reset gates, computed jointly: [x, h] → 2·state_size
    gates: Linear<B>,
    /// Candidate activation: [x, r ⊙ h] → state_size
    candidate: Linear<B>,
    state_size: usize,
}

impl<B: Backend> GruCell<B> {
    pub fn new(input_size: usize, state_size: usize, device: &B::Device) -> Self {
        Self {
            gates: LinearConfig::new(input_size + state_size, 2 * state_size).init(device),
            candidate: LinearConfig::new(input_size + state_size, state_size).init(device),
            state_size,
        }
    }
}

impl<B: Backend> SequenceCell<B> for GruCell<B> {
    fn zero_state(&self, batch_size: usize, device: &B::Device) -> CellState<B> {
        CellState {
            hidden: Tensor::zeros([batch_size, self.state_size], device),
            memory: None,
        }
    }

    fn step(&self, state: CellState<B>, input: Tensor<B, 2>) -> (CellState<B>, Tensor<B, 2>) {
        let [batch, _] = input.dims();
        let h = self.state_size;

        let combined = Tensor::cat(vec![input.clone(), state.hidden.clone()], 1);
        let gate_pre = sigmoid(self.gates.forward(combined));
        let update = gate_pre.clone().slice([0..batch, 0..h]);
        let reset = gate_pre.slice([0..batch, h..2 * h]);

        let gated = Tensor::cat(vec![input, state.hidden.clone() * reset], 1);
        let cand = self.candidate.forward(gated).tanh();

        // new_h = u ⊙ h + (1 − u) ⊙ candidate
        let hidden =
            update.clone() * state.hidden + (update.ones_like() - update) * cand;

        let next = CellState { hidden: hidden.clone(), memory: None };
        (next, hidden)
    }
}

// ─── LSTM ─────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    /// Input, forget, candidate and output gates jointly:
    /// [x, h] → 4·state_size
    gates: Linear<B>,
    state_size: usize,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(input_size: usize, state_size: usize, device: &B::Device) -> Self {
        Self {
            gates: LinearConfig::new(input_size + state_size, 4 * state_size).init(device),
            state_size,
        }
    }

    fn split_gates(
        &self,
        pre: Tensor<B, 2>,
        batch: usize,
    ) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
        let h = self.state_size;
        (
            pre.clone().slice([0..batch, 0..h]),
            pre.clone().slice([0..batch, h..2 * h]),
            pre.clone().slice([0..batch, 2 * h..3 * h]),
            pre.slice([0..batch, 3 * h..4 * h]),
        )
    }
}

impl<B: Backend> SequenceCell<B> for LstmCell<B> {
    fn zero_state(&self, batch_size: usize, device: &B::Device) -> CellState<B> {
        CellState {
            hidden: Tensor::zeros([batch_size, self.state_size], device),
            memory: Some(Tensor::zeros([batch_size, self.state_size], device)),
        }
    }

    fn step(&self, state: CellState<B>, input: Tensor<B, 2>) -> (CellState<B>, Tensor<B, 2>) {
        let [batch, _] = input.dims();
        let prev_memory = state
            .memory
            .unwrap_or_else(|| state.hidden.zeros_like());

        let combined = Tensor::cat(vec![input, state.hidden], 1);
        let pre = self.gates.forward(combined);
        let (i_pre, f_pre, g_pre, o_pre) = self.split_gates(pre, batch);

        let input_gate = sigmoid(i_pre);
        // Forget bias 1.0 so the memory path starts mostly open
        let forget_gate = sigmoid(f_pre.add_scalar(1.0));
        let candidate = g_pre.tanh();
        let output_gate = sigmoid(o_pre);

        let memory = forget_gate * prev_memory + input_gate * candidate;
        let hidden = output_gate * memory.clone().tanh();

        let next = CellState { hidden: hidden.clone(), memory: Some(memory) };
        (next, hidden)
    }
}

// ─── Layer-normalised LSTM ────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct LayerNormLstmCell<B: Backend> {
    gates: Linear<B>,
    norm_input: LayerNorm<B>,
    norm_forget: LayerNorm<B>,
    norm_candidate: LayerNorm<B>,
    norm_output: LayerNorm<B>,
    /// Normalises the new memory before the output nonlinearity
    norm_memory: LayerNorm<B>,
    state_size: usize,
}

impl<B: Backend> LayerNormLstmCell<B> {
    pub fn new(input_size: usize, state_size: usize, device: &B::Device) -> Self {
        Self {
            gates: LinearConfig::new(input_size + state_size, 4 * state_size).init(device),
            norm_input: LayerNormConfig::new(state_size).init(device),
            norm_forget: LayerNormConfig::new(state_size).init(device),
            norm_candidate: LayerNormConfig::new(state_size).init(device),
            norm_output: LayerNormConfig::new(state_size).init(device),
            norm_memory: LayerNormConfig::new(state_size).init(device),
            state_size,
        }
    }
}

impl<B: Backend> SequenceCell<B> for LayerNormLstmCell<B> {
    fn zero_state(&self, batch_size: usize, device: &B::Device) -> CellState<B> {
        CellState {
            hidden: Tensor::zeros([batch_size, self.state_size], device),
            memory: Some(Tensor::zeros([batch_size, self.state_size], device)),
        }
    }

    fn step(&self, state: CellState<B>, input: Tensor<B, 2>) -> (CellState<B>, Tensor<B, 2>) {
        let [batch, _] = input.dims();
        let h = self.state_size;
        let prev_memory = state
            .memory
            .unwrap_or_else(|| state.hidden.zeros_like());

        let combined = Tensor::cat(vec![input, state.hidden], 1);
        let pre = self.gates.forward(combined);

        let i_pre = self.norm_input.forward(pre.clone().slice([0..batch, 0..h]));
        let f_pre = self.norm_forget.forward(pre.clone().slice([0..batch, h..2 * h]));
        let g_pre = self
            .norm_candidate
            .forward(pre.clone().slice([0..batch, 2 * h..3 * h]));
        let o_pre = self.norm_output.forward(pre.slice([0..batch, 3 * h..4 * h]));

        let input_gate = sigmoid(i_pre);
        let forget_gate = sigmoid(f_pre.add_scalar(1.0));
        let candidate = g_pre.tanh();
        let output_gate = sigmoid(o_pre);

        let memory = forget_gate * prev_memory + input_gate * candidate;
        let hidden = output_gate * self.norm_memory.forward(memory.clone()).tanh();

        let next = CellState { hidden: hidden.clone(), memory: Some(memory) };
        (next, hidden)
    }
}

// ─── Variant dispatch ─────────────────────────────────────────────────────────
/// Holds exactly one of the three cell variants.
///
/// burn's Module derive wants concrete struct fields, so the
/// configuration-time polymorphism is expressed with Option fields
/// rather than a trait object; exactly one is Some, enforced by
/// `AnyCell::new`.
#[derive(Module, Debug)]
pub struct AnyCell<B: Backend> {
    gru: Option<GruCell<B>>,
    lstm: Option<LstmCell<B>>,
    ln_lstm: Option<LayerNormLstmCell<B>>,
}

impl<B: Backend> AnyCell<B> {
    pub fn new(kind: CellKind, input_size: usize, state_size: usize, device: &B::Device) -> Self {
        match kind {
            CellKind::Gru => Self {
                gru: Some(GruCell::new(input_size, state_size, device)),
                lstm: None,
                ln_lstm: None,
            },
            CellKind::Lstm => Self {
                gru: None,
                lstm: Some(LstmCell::new(input_size, state_size, device)),
                ln_lstm: None,
            },
            CellKind::LayerNormLstm => Self {
                gru: None,
                lstm: None,
                ln_lstm: Some(LayerNormLstmCell::new(input_size, state_size, device)),
            },
        }
    }
}

impl<B: Backend> SequenceCell<B> for AnyCell<B> {
    fn zero_state(&self, batch_size: usize, device: &B::Device) -> CellState<B> {
        if let Some(cell) = &self.gru {
            cell.zero_state(batch_size, device)
        } else if let Some(cell) = &self.lstm {
            cell.zero_state(batch_size, device)
        } else if let Some(cell) = &self.ln_lstm {
            cell.zero_state(batch_size, device)
        } else {
            unreachable!("AnyCell::new always sets exactly one variant")
        }
    }

    fn step(&self, state: CellState<B>, input: Tensor<B, 2>) -> (CellState<B>, Tensor<B, 2>) {
        if let Some(cell) = &self.gru {
            cell.step(state, input)
        } else if let Some(cell) = &self.lstm {
            cell.step(state, input)
        } else if let Some(cell) = &self.ln_lstm {
            cell.step(state, input)
        } else {
            unreachable!("AnyCell::new always sets exactly one variant")
        }
    }
}

// ─── Multi-layer stack ────────────────────────────────────────────────────────
/// A stack of cells stepped together, deepest layer last.
///
/// Every cell is wrapped with input and output dropout, mirroring a
/// per-cell DropoutWrapper. Dropout only fires when the explicit
/// `training` flag is set; inference paths pass `false` so
/// keep-probability is effectively 1.
#[derive(Module, Debug)]
pub struct CellStack<B: Backend> {
    layers: Vec<AnyCell<B>>,
    input_dropout: Dropout,
    output_dropout: Dropout,
    state_size: usize,
}

impl<B: Backend> CellStack<B> {
    pub fn new(
        kind: CellKind,
        num_layers: usize,
        input_size: usize,
        state_size: usize,
        input_keep_prob: f64,
        output_keep_prob: f64,
        device: &B::Device,
    ) -> Self {
        // Layer 0 reads the external input; deeper layers read the
        // previous layer's output, which is state_size wide.
        let layers = (0..num_layers)
            .map(|layer| {
                let width = if layer == 0 { input_size } else { state_size };
                AnyCell::new(kind, width, state_size, device)
            })
            .collect();
        Self {
            layers,
            input_dropout: DropoutConfig::new(1.0 - input_keep_prob).init(),
            output_dropout: DropoutConfig::new(1.0 - output_keep_prob).init(),
            state_size,
        }
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// One zero state per layer.
    pub fn zero_state(&self, batch_size: usize, device: &B::Device) -> Vec<CellState<B>> {
        self.layers
            .iter()
            .map(|cell| cell.zero_state(batch_size, device))
            .collect()
    }

    /// Step every layer once. Returns the new per-layer states and
    /// the top layer's output.
    pub fn step(
        &self,
        states: Vec<CellState<B>>,
        input: Tensor<B, 2>,
        training: bool,
    ) -> (Vec<CellState<B>>, Tensor<B, 2>) {
        let mut next_states = Vec::with_capacity(self.layers.len());
        let mut x = input;

        for (cell, state) in self.layers.iter().zip(states) {
            let cell_input = if training {
                self.input_dropout.forward(x)
            } else {
                x
            };
            let (new_state, output) = cell.step(state, cell_input);
            next_states.push(new_state);
            x = if training {
                self.output_dropout.forward(output)
            } else {
                output
            };
        }

        (next_states, x)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    #[test]
    fn test_gru_state_has_no_memory() {
        let cell = GruCell::<TestBackend>::new(4, 8, &device());
        let state = cell.zero_state(3, &device());
        assert_eq!(state.hidden.dims(), [3, 8]);
        assert!(state.memory.is_none());
    }

    #[test]
    fn test_lstm_state_has_memory() {
        let cell = LstmCell::<TestBackend>::new(4, 8, &device());
        let state = cell.zero_state(3, &device());
        assert_eq!(state.hidden.dims(), [3, 8]);
        assert_eq!(state.memory.unwrap().dims(), [3, 8]);
    }

    #[test]
    fn test_step_shapes_for_every_variant() {
        for kind in [CellKind::Gru, CellKind::Lstm, CellKind::LayerNormLstm] {
            let cell = AnyCell::<TestBackend>::new(kind, 5, 7, &device());
            let state = cell.zero_state(2, &device());
            let input = Tensor::ones([2, 5], &device());
            let (next, output) = cell.step(state, input);
            assert_eq!(next.hidden.dims(), [2, 7]);
            assert_eq!(output.dims(), [2, 7]);
        }
    }

    #[test]
    fn test_stack_steps_all_layers() {
        let stack = CellStack::<TestBackend>::new(CellKind::Gru, 3, 4, 6, 1.0, 1.0, &device());
        let states = stack.zero_state(2, &device());
        assert_eq!(states.len(), 3);

        let input = Tensor::ones([2, 4], &device());
        let (next, output) = stack.step(states, input, false);
        assert_eq!(next.len(), 3);
        assert_eq!(output.dims(), [2, 6]);
    }

    #[test]
    fn test_select_keeps_previous_state_when_inactive() {
        let stepped = CellState::<TestBackend> {
            hidden: Tensor::ones([2, 3], &device()),
            memory: None,
        };
        let previous = CellState::<TestBackend> {
            hidden: Tensor::zeros([2, 3], &device()),
            memory: None,
        };
        // First sequence active, second finished
        let active = Tensor::<TestBackend, 1>::from_floats([1.0, 0.0], &device())
            .reshape([2, 1]);

        let selected = stepped.select(previous, active);
        let values: Vec<f32> = selected.hidden.into_data().to_vec().unwrap();
        assert_eq!(values, vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
    }
}
