//! Per-frame sequencing of the visualize and simulate passes.
//!
//! Every running frame is, strictly in this order: visualize, simulate,
//! barrier, present. The barrier blocks until the simulate pass's writes to
//! both fields and the agent buffer have completed, so the next visualize
//! never sees a half-written field and the next step never races the
//! previous one.

use std::time::{Duration, Instant};

use log::{info, trace, warn};

use crate::config::{DispatchCoverage, Settings};
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Only the visualize pass runs until the start trigger arrives.
    AwaitingStart,
    /// Terminal for the lifetime of the run.
    Running,
}

#[derive(Debug, Clone)]
pub struct RunState {
    phase: Phase,
    started: Instant,
    frame: u32,
}

impl RunState {
    /// `started` is the instant the simulate kernel's time input counts from.
    pub fn new(started: Instant) -> Self {
        RunState {
            phase: Phase::AwaitingStart,
            started,
            frame: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn awaiting_start(&self) -> bool {
        self.phase == Phase::AwaitingStart
    }

    /// Number of simulate steps dispatched so far.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Returns whether this call moved the run out of `AwaitingStart`.
    fn start(&mut self) -> bool {
        let changed = self.phase == Phase::AwaitingStart;
        self.phase = Phase::Running;
        changed
    }
}

/// How many work-groups one simulate step dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPlan {
    agents: u32,
    divisor: u32,
    coverage: DispatchCoverage,
}

impl DispatchPlan {
    pub fn new(agents: u32, divisor: u32, coverage: DispatchCoverage) -> Result<Self> {
        if divisor == 0 {
            return Err(ConfigError::Invalid {
                key: "dispatchDivisor",
                reason: "must be positive".into(),
            }
            .into());
        }
        Ok(DispatchPlan {
            agents,
            divisor,
            coverage,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.agent_number,
            settings.dispatch_divisor,
            settings.dispatch_coverage,
        )
    }

    pub fn divisor(&self) -> u32 {
        self.divisor
    }

    pub fn workgroups(&self) -> u32 {
        match self.coverage {
            DispatchCoverage::RoundUp => self.agents.div_ceil(self.divisor),
            DispatchCoverage::Truncate => self.agents / self.divisor,
        }
    }

    /// Agents that are actually stepped each frame.
    pub fn covered_agents(&self) -> u32 {
        let invocations = self.workgroups() as u64 * self.divisor as u64;
        invocations.min(self.agents as u64) as u32
    }

    pub fn uncovered_agents(&self) -> u32 {
        self.agents - self.covered_agents()
    }
}

/// Inputs to one simulate dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulateStep {
    /// Seconds since startup.
    pub time: f32,
    pub frame: u32,
    pub workgroups: u32,
}

/// The device-side work of a frame. Implemented over wgpu for the real run
/// and by recorders in tests.
pub trait FramePasses {
    /// Draws the trail and agent fields over the full surface.
    fn visualize(&mut self) -> Result<()>;
    /// Steps every covered agent once.
    fn simulate(&mut self, step: &SimulateStep) -> Result<()>;
    /// Submits recorded work and blocks until the device has finished it.
    fn barrier(&mut self) -> Result<()>;
    fn present(&mut self);
}

/// Discrete input sampled for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInput {
    pub start_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Only the visualize pass ran.
    Waiting,
    /// The start trigger arrived this tick; stepping begins next tick.
    Started,
    Stepped,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    plan: DispatchPlan,
}

impl Orchestrator {
    pub fn new(plan: DispatchPlan) -> Self {
        if plan.uncovered_agents() > 0 {
            warn!(
                "dispatch of {} groups x {} covers {} agents; {} never move",
                plan.workgroups(),
                plan.divisor(),
                plan.covered_agents(),
                plan.uncovered_agents()
            );
        }
        Orchestrator { plan }
    }

    pub fn plan(&self) -> &DispatchPlan {
        &self.plan
    }

    /// Runs one frame. Any error is fatal for the run.
    pub fn tick<P: FramePasses + ?Sized>(
        &self,
        state: &mut RunState,
        passes: &mut P,
        input: FrameInput,
        now: Instant,
    ) -> Result<TickOutcome> {
        match state.phase {
            Phase::AwaitingStart => {
                passes.visualize()?;
                passes.barrier()?;
                passes.present();

                if input.start_requested && state.start() {
                    info!("simulation started");
                    return Ok(TickOutcome::Started);
                }
                Ok(TickOutcome::Waiting)
            }
            Phase::Running => {
                let step = SimulateStep {
                    time: state.elapsed(now).as_secs_f32(),
                    frame: state.frame,
                    workgroups: self.plan.workgroups(),
                };
                trace!("frame {}: {:?}", state.frame, step);

                passes.visualize()?;
                passes.simulate(&step)?;
                passes.barrier()?;
                passes.present();

                state.frame = state.frame.wrapping_add(1);
                Ok(TickOutcome::Stepped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SlimeError;

    #[derive(Debug, Clone, PartialEq)]
    enum Pass {
        Visualize,
        Simulate(SimulateStep),
        Barrier,
        Present,
    }

    #[derive(Default)]
    struct Recorder {
        passes: Vec<Pass>,
        fail_simulate: bool,
    }

    impl FramePasses for Recorder {
        fn visualize(&mut self) -> Result<()> {
            self.passes.push(Pass::Visualize);
            Ok(())
        }

        fn simulate(&mut self, step: &SimulateStep) -> Result<()> {
            if self.fail_simulate {
                return Err(SlimeError::Dispatch {
                    phase: "simulate",
                    reason: "device lost".into(),
                });
            }
            self.passes.push(Pass::Simulate(*step));
            Ok(())
        }

        fn barrier(&mut self) -> Result<()> {
            self.passes.push(Pass::Barrier);
            Ok(())
        }

        fn present(&mut self) {
            self.passes.push(Pass::Present);
        }
    }

    fn orchestrator(agents: u32) -> Orchestrator {
        Orchestrator::new(DispatchPlan::new(agents, 32, DispatchCoverage::RoundUp).unwrap())
    }

    const START: FrameInput = FrameInput {
        start_requested: true,
    };

    #[test]
    fn waits_for_start_with_visualize_only() {
        let orchestrator = orchestrator(64);
        let now = Instant::now();
        let mut state = RunState::new(now);
        let mut recorder = Recorder::default();

        for _ in 0..3 {
            let outcome = orchestrator
                .tick(&mut state, &mut recorder, FrameInput::default(), now)
                .unwrap();
            assert_eq!(outcome, TickOutcome::Waiting);
        }
        assert!(state.awaiting_start());
        assert!(!recorder
            .passes
            .iter()
            .any(|pass| matches!(pass, Pass::Simulate(_))));
        assert_eq!(
            recorder.passes[..3],
            [Pass::Visualize, Pass::Barrier, Pass::Present]
        );
    }

    #[test]
    fn start_trigger_is_one_way() {
        let orchestrator = orchestrator(64);
        let now = Instant::now();
        let mut state = RunState::new(now);
        let mut recorder = Recorder::default();

        let outcome = orchestrator.tick(&mut state, &mut recorder, START, now).unwrap();
        assert_eq!(outcome, TickOutcome::Started);
        assert_eq!(state.phase(), Phase::Running);

        let outcome = orchestrator.tick(&mut state, &mut recorder, START, now).unwrap();
        assert_eq!(outcome, TickOutcome::Stepped);
        let outcome = orchestrator
            .tick(&mut state, &mut recorder, FrameInput::default(), now)
            .unwrap();
        assert_eq!(outcome, TickOutcome::Stepped);
        assert_eq!(state.phase(), Phase::Running);
        assert_eq!(state.frame(), 2);
    }

    #[test]
    fn running_frames_draw_then_step_then_barrier() {
        let orchestrator = orchestrator(100);
        let started = Instant::now();
        let mut state = RunState::new(started);
        let mut recorder = Recorder::default();
        orchestrator.tick(&mut state, &mut recorder, START, started).unwrap();
        recorder.passes.clear();

        let now = started + Duration::from_millis(1500);
        orchestrator
            .tick(&mut state, &mut recorder, FrameInput::default(), now)
            .unwrap();
        assert_eq!(
            recorder.passes,
            [
                Pass::Visualize,
                Pass::Simulate(SimulateStep {
                    time: 1.5,
                    frame: 0,
                    workgroups: 4,
                }),
                Pass::Barrier,
                Pass::Present,
            ]
        );
    }

    #[test]
    fn every_visualize_after_a_step_is_preceded_by_a_barrier() {
        let orchestrator = orchestrator(1000);
        let started = Instant::now();
        let mut state = RunState::new(started);
        let mut recorder = Recorder::default();

        for tick in 0..20u64 {
            let input = FrameInput {
                start_requested: tick == 4,
            };
            let now = started + Duration::from_millis(16 * tick);
            orchestrator.tick(&mut state, &mut recorder, input, now).unwrap();
        }

        let mut pending_write = false;
        for pass in &recorder.passes {
            match pass {
                Pass::Simulate(_) => {
                    assert!(!pending_write, "two steps without a barrier");
                    pending_write = true;
                }
                Pass::Barrier => pending_write = false,
                Pass::Visualize | Pass::Present => {
                    assert!(!pending_write, "{pass:?} observed an unfinished step")
                }
            }
        }
        let steps = recorder
            .passes
            .iter()
            .filter(|pass| matches!(pass, Pass::Simulate(_)))
            .count();
        assert_eq!(steps, 15);
    }

    #[test]
    fn step_time_counts_from_startup() {
        let orchestrator = orchestrator(32);
        let started = Instant::now();
        let mut state = RunState::new(started);
        let mut recorder = Recorder::default();
        orchestrator
            .tick(&mut state, &mut recorder, START, started + Duration::from_secs(2))
            .unwrap();
        orchestrator
            .tick(&mut state, &mut recorder, START, started + Duration::from_secs(3))
            .unwrap();

        let step = recorder.passes.iter().find_map(|pass| match pass {
            Pass::Simulate(step) => Some(*step),
            _ => None,
        });
        assert_eq!(step.map(|s| s.time), Some(3.0));
    }

    #[test]
    fn failed_step_stops_the_frame() {
        let orchestrator = orchestrator(32);
        let now = Instant::now();
        let mut state = RunState::new(now);
        let mut recorder = Recorder::default();
        orchestrator.tick(&mut state, &mut recorder, START, now).unwrap();
        recorder.passes.clear();
        recorder.fail_simulate = true;

        let err = orchestrator
            .tick(&mut state, &mut recorder, FrameInput::default(), now)
            .unwrap_err();
        assert!(matches!(err, SlimeError::Dispatch { phase: "simulate", .. }));
        assert_eq!(recorder.passes, [Pass::Visualize]);
        assert_eq!(state.frame(), 0);
    }

    #[test]
    fn dispatch_plan_coverage() {
        let truncated = DispatchPlan::new(1000, 64, DispatchCoverage::Truncate).unwrap();
        assert_eq!(truncated.workgroups(), 15);
        assert_eq!(truncated.covered_agents(), 960);
        assert_eq!(truncated.uncovered_agents(), 40);

        let rounded = DispatchPlan::new(1000, 64, DispatchCoverage::RoundUp).unwrap();
        assert_eq!(rounded.workgroups(), 16);
        assert_eq!(rounded.covered_agents(), 1000);
        assert_eq!(rounded.uncovered_agents(), 0);

        for coverage in [DispatchCoverage::RoundUp, DispatchCoverage::Truncate] {
            let exact = DispatchPlan::new(1024, 32, coverage).unwrap();
            assert_eq!(exact.workgroups(), 32);
            assert_eq!(exact.uncovered_agents(), 0);
        }

        let tiny = DispatchPlan::new(10, 32, DispatchCoverage::Truncate).unwrap();
        assert_eq!(tiny.workgroups(), 0);
        assert_eq!(tiny.covered_agents(), 0);
    }

    #[test]
    fn zero_divisor_is_rejected() {
        let err = DispatchPlan::new(1000, 0, DispatchCoverage::RoundUp).unwrap_err();
        assert!(matches!(
            err,
            SlimeError::Config(ConfigError::Invalid { key: "dispatchDivisor", .. })
        ));
    }
}
