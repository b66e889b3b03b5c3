//! Benchmark Scenarios
//!
//! Every scenario runs the same four phases over all nodes in order: read own page,
//! write own page, read the next page, write the next page. Scenarios differ only in
//! the manager faults injected between phases.

use super::{BACKUP, Cluster, ClusterDump, PRIMARY};
use crate::node::PageRead;
use crate::protocol::types::{ManagerId, NodeId, PageId};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scenario {
    Baseline,
    PrimaryDead,
    PrimaryRestart,
    AlternatingFaults,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Baseline,
        Scenario::PrimaryDead,
        Scenario::PrimaryRestart,
        Scenario::AlternatingFaults,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Scenario::Baseline => "BASELINE FAULT FREE BENCHMARK",
            Scenario::PrimaryDead => "PRIMARY CM FAULT (DEAD) BENCHMARK",
            Scenario::PrimaryRestart => "PRIMARY CM FAULT (DEAD AND RESTART) BENCHMARK",
            Scenario::AlternatingFaults => "MULTIPLE PRIMARY CM FAULT (DEAD AND RESTART) BENCHMARK",
        }
    }

    pub fn steps(&self) -> Vec<Step> {
        use Phase::*;
        use Step::{Fault, Run};

        match self {
            Scenario::Baseline => vec![Run(ReadOwn), Run(WriteOwn), Run(ReadNext), Run(WriteNext)],
            Scenario::PrimaryDead => vec![
                Run(ReadOwn),
                Run(WriteOwn),
                Fault(PRIMARY),
                Run(ReadNext),
                Run(WriteNext),
            ],
            Scenario::PrimaryRestart => vec![
                Run(ReadOwn),
                Run(WriteOwn),
                Fault(PRIMARY),
                Fault(BACKUP),
                Run(ReadNext),
                Run(WriteNext),
            ],
            Scenario::AlternatingFaults => vec![
                Run(ReadOwn),
                Run(WriteOwn),
                Fault(PRIMARY),
                Fault(BACKUP),
                Run(ReadNext),
                Fault(PRIMARY),
                Run(WriteNext),
            ],
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::Baseline => "baseline",
            Scenario::PrimaryDead => "primary-dead",
            Scenario::PrimaryRestart => "primary-restart",
            Scenario::AlternatingFaults => "alternating-faults",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Scenario {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "baseline" => Ok(Scenario::Baseline),
            "2" | "primary-dead" => Ok(Scenario::PrimaryDead),
            "3" | "primary-restart" => Ok(Scenario::PrimaryRestart),
            "4" | "alternating-faults" => Ok(Scenario::AlternatingFaults),
            other => anyhow::bail!("unknown scenario '{}', expected 1-4 or a scenario name", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadOwn,
    WriteOwn,
    ReadNext,
    WriteNext,
}

/// One step of a scenario: a phase over all nodes, or a kill-and-restart of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Run(Phase),
    Fault(ManagerId),
}

/// The page node `node` treats as its own; wraps when nodes outnumber pages.
pub fn own_page(node: NodeId, page_count: u32) -> PageId {
    PageId((node.0 - 1) % page_count + 1)
}

pub fn next_page(node: NodeId, page_count: u32) -> PageId {
    PageId(own_page(node, page_count).0 % page_count + 1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub scenario: Scenario,
    pub elapsed: Duration,
    pub operations: u64,
    pub failed_operations: u64,
    pub messages_sent: u64,
    pub dumps: Vec<ClusterDump>,
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "**************************************************")?;
        writeln!(f, " CONCLUSION ")?;
        writeln!(f, "**************************************************")?;
        for dump in &self.dumps {
            write!(f, "{}", dump)?;
        }
        writeln!(
            f,
            "Operations = {} ({} failed), messages sent = {}",
            self.operations, self.failed_operations, self.messages_sent
        )?;
        writeln!(f, "Time taken = {:.2} seconds ", self.elapsed.as_secs_f64())
    }
}

/// Runs `scenario` to completion and reports the final tables of both replicas.
///
/// A failed operation (for example a timed-out grant) is counted and logged, and the
/// run carries on; only a refused fault injection aborts it.
pub async fn run(cluster: &mut Cluster, scenario: Scenario) -> anyhow::Result<BenchmarkReport> {
    tracing::info!("**************************************************");
    tracing::info!(" {} ", scenario.title());
    tracing::info!("**************************************************");

    let messages_before = cluster.network().messages_sent();
    let start = Instant::now();
    let mut operations = 0;
    let mut failed_operations = 0;

    for step in scenario.steps() {
        match step {
            Step::Run(phase) => {
                let (done, failed) = run_phase(cluster, phase).await;
                operations += done;
                failed_operations += failed;
            }
            Step::Fault(manager) => {
                cluster
                    .controller_mut()
                    .kill_and_restart(manager)
                    .await
                    .with_context(|| format!("failed to kill and restart CM {}", manager))?;
            }
        }
    }

    let elapsed = start.elapsed();
    let messages_sent = cluster.network().messages_sent() - messages_before;

    let mut dumps = Vec::new();
    for manager in cluster.controller().manager_ids() {
        let dump = cluster
            .state_dump(manager)
            .await
            .with_context(|| format!("failed to dump CM {}", manager))?;
        dumps.push(dump);
    }

    Ok(BenchmarkReport {
        scenario,
        elapsed,
        operations,
        failed_operations,
        messages_sent,
        dumps,
    })
}

/// Returns `(operations, failures)`.
async fn run_phase(cluster: &Cluster, phase: Phase) -> (u64, u64) {
    let page_count = cluster.config().page_count;
    let mut operations = 0;
    let mut failures = 0;

    for id in cluster.node_ids() {
        let Ok(node) = cluster.node(id) else {
            continue;
        };

        let result = match phase {
            Phase::ReadOwn => node.read(own_page(id, page_count)).await.map(log_read),
            Phase::WriteOwn => node
                .write(own_page(id, page_count), format!("This is written by node id {}", id))
                .await
                .map(|_| ()),
            Phase::ReadNext => node.read(next_page(id, page_count)).await.map(log_read),
            Phase::WriteNext => node
                .write(next_page(id, page_count), format!("This is written by pid {}", id))
                .await
                .map(|_| ()),
        };

        operations += 1;
        if let Err(e) = result {
            failures += 1;
            tracing::error!("[Node {}] {:?} failed: {}", id, phase, e);
        }
    }

    (operations, failures)
}

fn log_read(read: PageRead) {
    match read.content() {
        Some(content) => tracing::debug!("> read \"{}\"", content),
        None => tracing::debug!("> read an untouched page"),
    }
}
