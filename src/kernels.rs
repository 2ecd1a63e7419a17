//! The kernel programs the orchestrator drives.
//!
//! There is a single visualize kernel and a family of simulate kernels that
//! all honour the same binding contract (see [`crate::resources::BindingSlot`]),
//! so the frame loop never needs to know which variant is running.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::constants::WORKGROUP_SIZE_CONSTANT;
use crate::error::ConfigError;

pub const VISUALIZE_SOURCE: &str = include_str!("shaders/visualize.wgsl");

/// What a simulate kernel does with the trail field beyond moving agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Agents steer toward trail concentration.
    pub senses_trail: bool,
    /// Trail is attenuated and spread every step.
    pub diffuses_trail: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum SimulationKernel {
    /// Agents move in straight lines, bounce off the edges and deposit trail.
    Stage1,
    /// Stage 1 plus trail decay and diffusion.
    Stage2,
    /// Stage 2 plus three-sensor steering.
    StageFinal,
}

impl SimulationKernel {
    pub const ALL: [SimulationKernel; 3] = [Self::Stage1, Self::Stage2, Self::StageFinal];

    pub fn name(self) -> &'static str {
        match self {
            Self::Stage1 => "stage1",
            Self::Stage2 => "stage2",
            Self::StageFinal => "stageFinal",
        }
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::Stage1 => Capabilities {
                senses_trail: false,
                diffuses_trail: false,
            },
            Self::Stage2 => Capabilities {
                senses_trail: false,
                diffuses_trail: true,
            },
            Self::StageFinal => Capabilities {
                senses_trail: true,
                diffuses_trail: true,
            },
        }
    }

    fn body(self) -> &'static str {
        match self {
            Self::Stage1 => include_str!("shaders/stage1.wgsl"),
            Self::Stage2 => include_str!("shaders/stage2.wgsl"),
            Self::StageFinal => include_str!("shaders/stage_final.wgsl"),
        }
    }

    /// Kernel source with `WORKGROUP_SIZE` fixed to `workgroup_size`
    /// invocations, the dispatch divisor of the run.
    pub fn source(self, workgroup_size: u32) -> Cow<'static, str> {
        Cow::Owned(format!(
            "const {WORKGROUP_SIZE_CONSTANT}: u32 = {workgroup_size}u;\n\n{}",
            self.body()
        ))
    }
}

impl fmt::Display for SimulationKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SimulationKernel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kernel| kernel.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.name()).collect();
                ConfigError::UnknownKernel(s.to_owned(), known.join(", "))
            })
    }
}

impl TryFrom<String> for SimulationKernel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
