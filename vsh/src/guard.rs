//! Resource limits for untrusted scripts.
//!
//! Three independent counters: function call depth, commands per top-level
//! `exec`, and iterations per loop instance. A breach ends only the construct
//! that hit it, with status 1 and a message saying how to raise the limit.

use std::fmt;

use vsh_config::LimitsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub max_call_depth: usize,
    pub max_command_count: usize,
    pub max_loop_iterations: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for ExecutionLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_call_depth: config.max_call_depth,
            max_command_count: config.max_command_count,
            max_loop_iterations: config.max_loop_iterations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    CallDepth,
    CommandCount,
    LoopIterations,
}

impl Limit {
    const fn field(self) -> &'static str {
        match self {
            Self::CallDepth => "max_call_depth",
            Self::CommandCount => "max_command_count",
            Self::LoopIterations => "max_loop_iterations",
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::CallDepth => "maximum function call depth",
            Self::CommandCount => "maximum command count",
            Self::LoopIterations => "maximum loop iterations",
        }
    }
}

/// A limit that was hit, with the value in force at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitExceeded {
    pub limit: Limit,
    pub max: usize,
}

impl LimitExceeded {
    fn new(limit: Limit, max: usize) -> Self {
        tracing::warn!(limit = limit.field(), max, "execution limit exceeded");
        Self { limit, max }
    }

    /// Message written to stderr, newline-terminated.
    #[must_use]
    pub fn message(&self) -> String {
        format!("vsh: {self}\n")
    }
}

impl fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exceeded ({}); raise ExecutionLimits::{} (config limits.{}) to allow more",
            self.limit.describe(),
            self.max,
            self.limit.field(),
            self.limit.field()
        )
    }
}

impl ExecutionLimits {
    /// `depth` is the call depth after entering the new function.
    pub fn check_call_depth(&self, depth: usize) -> Result<(), LimitExceeded> {
        if depth > self.max_call_depth {
            return Err(LimitExceeded::new(Limit::CallDepth, self.max_call_depth));
        }
        Ok(())
    }

    /// `count` is the command count after counting the current entry.
    pub fn check_command_count(&self, count: usize) -> Result<(), LimitExceeded> {
        if count > self.max_command_count {
            return Err(LimitExceeded::new(
                Limit::CommandCount,
                self.max_command_count,
            ));
        }
        Ok(())
    }

    /// A fresh counter for one loop instance.
    #[must_use]
    pub const fn loop_counter(&self) -> LoopCounter {
        LoopCounter {
            iterations: 0,
            max: self.max_loop_iterations,
        }
    }
}

/// Iteration budget owned by a single loop execution; nested loops get their
/// own.
#[derive(Debug)]
pub struct LoopCounter {
    iterations: usize,
    max: usize,
}

impl LoopCounter {
    /// Counts one iteration, failing once the budget is spent.
    pub fn tick(&mut self) -> Result<(), LimitExceeded> {
        self.iterations += 1;
        if self.iterations > self.max {
            return Err(LimitExceeded::new(Limit::LoopIterations, self.max));
        }
        Ok(())
    }
}
