//! The token-by-token decode loop shared by the local backends.

use candle_core::{DType, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::utils::apply_repeat_penalty;

use crate::error::{ChatError, Result};
use crate::stop::StopSignal;
use crate::stream::TokenSink;
use crate::types::{GenerationConfig, StopReason};

/// Seed used when the request does not pin one.
pub const DEFAULT_SEED: u64 = 299_792_458;

/// Window of recent tokens the repetition penalty looks at.
pub const REPEAT_LAST_N: usize = 64;

/// A causal language model with an internal key/value cache.
pub trait CausalLm: Send {
    /// Run `tokens` starting at absolute position `index_pos` and return the
    /// logits for the last position. Shapes `[vocab]`, `[1, vocab]` and
    /// `[1, seq, vocab]` are accepted.
    fn forward(&mut self, tokens: &[u32], index_pos: usize) -> Result<Tensor>;

    /// Drop cached state before a fresh prompt.
    fn reset(&mut self) -> Result<()>;
}

/// What a decode loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOutcome {
    pub generated: usize,
    pub reason: StopReason,
}

/// Build the sampler for `config`. A missing or zero temperature means greedy.
pub fn logits_processor(config: &GenerationConfig) -> LogitsProcessor {
    let seed = config.seed.unwrap_or(DEFAULT_SEED);
    let sampling = match config.temperature {
        Some(temperature) if temperature > 0.0 => match (config.top_k, config.top_p) {
            (Some(k), Some(p)) if p < 1.0 => Sampling::TopKThenTopP { k, p, temperature },
            (Some(k), _) => Sampling::TopK { k, temperature },
            (None, Some(p)) if p < 1.0 => Sampling::TopP { p, temperature },
            (None, _) => Sampling::All { temperature },
        },
        _ => Sampling::ArgMax,
    };
    LogitsProcessor::from_sampling(seed, sampling)
}

/// Generate up to `config.token_budget()` tokens after `prompt_ids`.
///
/// The prompt is pushed to `sink` first, then every sampled token as it is
/// produced. `signal` is checked before each step; once it is set the loop
/// exits and reports [`StopReason::Cancelled`] to the sink (a sink that
/// already finished, for example on a stop word, ignores that).
pub fn run_decode_loop(
    model: &mut dyn CausalLm,
    eos_token: Option<u32>,
    prompt_ids: &[u32],
    config: &GenerationConfig,
    sink: &mut dyn TokenSink,
    signal: &StopSignal,
) -> Result<DecodeOutcome> {
    if prompt_ids.is_empty() {
        return Err(ChatError::InvalidArgument("prompt encodes to no tokens".into()));
    }

    let budget = config.token_budget();
    let penalty = config.repetition_penalty.unwrap_or(1.0);
    let mut processor = logits_processor(config);

    sink.put(prompt_ids)?;
    model.reset()?;

    let mut tokens = prompt_ids.to_vec();
    let mut generated = 0;
    let mut reason = StopReason::MaxTokens;
    let mut logits = model.forward(prompt_ids, 0)?;

    while generated < budget {
        if signal.is_stopped() {
            reason = StopReason::Cancelled;
            break;
        }

        let mut last = last_position_logits(&logits)?;
        if penalty > 0.0 && (penalty - 1.0).abs() > f32::EPSILON {
            let start = tokens.len().saturating_sub(REPEAT_LAST_N);
            last = apply_repeat_penalty(&last, penalty, &tokens[start..])?;
        }

        let next = processor.sample(&last)?;
        if eos_token == Some(next) {
            reason = StopReason::EndOfText;
            break;
        }

        tokens.push(next);
        generated += 1;
        sink.put(&[next])?;

        if generated == budget {
            break;
        }
        if signal.is_stopped() {
            reason = StopReason::Cancelled;
            break;
        }
        logits = model.forward(&[next], tokens.len() - 1)?;
    }

    sink.end(reason)?;
    Ok(DecodeOutcome { generated, reason })
}

fn last_position_logits(logits: &Tensor) -> Result<Tensor> {
    let logits = logits.to_dtype(DType::F32)?;
    let logits = match logits.rank() {
        1 => logits,
        2 => logits.squeeze(0)?,
        _ => {
            let (_, seq_len, _) = logits.dims3()?;
            logits.squeeze(0)?.get(seq_len - 1)?
        }
    };
    Ok(logits)
}

/// Keep the newest tokens of an over-long prompt so that prompt and budget
/// fit in `max_length`. At least one prompt token is always kept.
pub fn truncate_prompt(prompt_ids: Vec<u32>, budget: usize, max_length: usize) -> Vec<u32> {
    if max_length == 0 || prompt_ids.len() + budget <= max_length {
        return prompt_ids;
    }
    let keep = max_length.saturating_sub(budget).max(1).min(prompt_ids.len());
    prompt_ids[prompt_ids.len() - keep..].to_vec()
}

/// Shrink `budget` so that prompt and generation fit in `max_length`.
pub fn fit_budget(prompt_len: usize, budget: usize, max_length: usize) -> usize {
    if max_length == 0 {
        return budget;
    }
    budget.min(max_length.saturating_sub(prompt_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_newest_tokens() {
        assert_eq!(truncate_prompt(vec![1, 2, 3], 2, 10), vec![1, 2, 3]);
        assert_eq!(truncate_prompt(vec![1, 2, 3, 4, 5], 2, 5), vec![3, 4, 5]);
        assert_eq!(truncate_prompt(vec![1, 2, 3], 10, 5), vec![3]);
        assert_eq!(truncate_prompt(vec![1, 2, 3], 10, 0), vec![1, 2, 3]);
    }

    #[test]
    fn budget_shrinks_to_the_remaining_context() {
        assert_eq!(fit_budget(3, 2, 10), 2);
        assert_eq!(fit_budget(1, 10, 5), 4);
        assert_eq!(fit_budget(1, 10, 1), 0);
        assert_eq!(fit_budget(3, 10, 0), 10);

        let kept = truncate_prompt(vec![1, 2, 3], 10, 5);
        assert!(kept.len() + fit_budget(kept.len(), 10, 5) <= 5);
    }

    #[test]
    fn greedy_without_temperature() -> Result<()> {
        let mut processor = logits_processor(&GenerationConfig::default());
        let logits = Tensor::new(&[0.1f32, 3.0, 0.2], &candle_core::Device::Cpu)?;
        assert_eq!(processor.sample(&logits)?, 1);
        Ok(())
    }
}
