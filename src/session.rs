//! Stages of the setup sequence, their failure policies and the progress
//! events reported to the caller.

use heapless::Vec;

use crate::error::Error;
use crate::registration::Status;

pub const STAGE_COUNT: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    BringUp,
    EchoOff,
    TimeZone,
    MnoProfile,
    Apn,
    Registration,
    ImportCa,
    ImportClientCert,
    ImportClientKey,
    AssignCa,
    AssignClientCert,
    AssignClientKey,
    Tls,
    ClientId,
    Broker,
    Credentials,
    WillTopic,
    WillMessage,
    KeepaliveInterval,
    Keepalive,
    Login,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::BringUp,
        Stage::EchoOff,
        Stage::TimeZone,
        Stage::MnoProfile,
        Stage::Apn,
        Stage::Registration,
        Stage::ImportCa,
        Stage::ImportClientCert,
        Stage::ImportClientKey,
        Stage::AssignCa,
        Stage::AssignClientCert,
        Stage::AssignClientKey,
        Stage::Tls,
        Stage::ClientId,
        Stage::Broker,
        Stage::Credentials,
        Stage::WillTopic,
        Stage::WillMessage,
        Stage::KeepaliveInterval,
        Stage::Keepalive,
        Stage::Login,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// What the setup sequence does when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StagePolicy {
    /// Stop and return [`Error::StageFailed`]
    Abort,
    /// Record the failure and carry on with the next stage
    Continue,
}

/// Failure policy of every stage.
///
/// Start from [`StagePolicies::strict`] or [`StagePolicies::lenient`] and
/// override single stages with [`StagePolicies::with`]. [`Stage::BringUp`]
/// always aborts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePolicies {
    policies: [StagePolicy; STAGE_COUNT],
}

impl StagePolicies {
    /// Abort on the first failing stage.
    pub const fn strict() -> Self {
        Self {
            policies: [StagePolicy::Abort; STAGE_COUNT],
        }
    }

    /// Continue past every failure except a failed bring-up.
    pub const fn lenient() -> Self {
        Self {
            policies: [StagePolicy::Continue; STAGE_COUNT],
        }
    }

    pub fn with(mut self, stage: Stage, policy: StagePolicy) -> Self {
        self.policies[stage.index()] = policy;
        self
    }

    pub fn policy(&self, stage: Stage) -> StagePolicy {
        match stage {
            Stage::BringUp => StagePolicy::Abort,
            s => self.policies[s.index()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    Succeeded,
    Failed(Error),
    /// The stage had no input, e.g. no APN configured
    Skipped,
}

/// Outcome of every stage the setup sequence reached, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    stages: Vec<(Stage, Outcome), STAGE_COUNT>,
}

impl SetupReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each stage runs at most once, so every stage has a slot.
    pub(crate) fn record(&mut self, stage: Stage, outcome: Outcome) {
        debug_assert!(
            self.outcome(stage).is_none(),
            "stage {:?} recorded twice",
            stage
        );
        if self.stages.push((stage, outcome)).is_err() {
            error!("No slot left to record stage {:?}", stage);
        }
    }

    pub fn outcome(&self, stage: Stage) -> Option<Outcome> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, o)| *o)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Stage, Outcome)> {
        self.stages.iter()
    }

    pub fn all_succeeded(&self) -> bool {
        self.stages
            .iter()
            .all(|(_, o)| matches!(o, Outcome::Succeeded | Outcome::Skipped))
    }

    pub fn failures(&self) -> impl Iterator<Item = (Stage, Error)> + '_ {
        self.stages.iter().filter_map(|(s, o)| match o {
            Outcome::Failed(e) => Some((*s, *e)),
            _ => None,
        })
    }
}

/// Progress notifications for a human facing sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    StageStarted(Stage),
    StageSucceeded(Stage),
    StageFailed(Stage, Error),
    StageSkipped(Stage),
    /// Another attempt of a retried stage is about to start
    Waiting(Stage),
    RegistrationChanged(Status),
    Published,
}

/// Injected print capability.
pub trait Console {
    fn event(&mut self, event: Event);
}

/// Console that drops everything.
pub struct NoConsole;

impl Console for NoConsole {
    fn event(&mut self, _event: Event) {}
}
