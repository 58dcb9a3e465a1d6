//! Per-block statistics collected during a run

use super::block::BlockKind;
use std::fmt;

/// How a block's execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Ran until its inputs (or its own sequence) were exhausted
    Exhausted,
    /// Every reader of every output went away before it finished
    Abandoned,
    /// Stopped because another block failed
    Aborted,
    /// Its own step failed
    Failed,
}

/// Statistics for one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReport {
    /// Position in the pipeline's entry list
    pub index: usize,
    pub name: String,
    pub kind: BlockKind,
    /// Successful step invocations
    pub steps: u64,
    /// Items accepted by output channels, counting discarded outputs
    pub emitted: u64,
    pub outcome: BlockOutcome,
}

/// Summary of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    blocks: Vec<BlockReport>,
}

impl RunReport {
    pub(crate) fn new(mut blocks: Vec<BlockReport>) -> Self {
        blocks.sort_by_key(|b| b.index);
        Self { blocks }
    }

    /// Reports in entry order
    pub fn blocks(&self) -> &[BlockReport] {
        &self.blocks
    }

    /// First block with this name
    pub fn block(&self, name: &str) -> Option<&BlockReport> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn total_steps(&self) -> u64 {
        self.blocks.iter().map(|b| b.steps).sum()
    }

    pub fn steps_for(&self, kind: BlockKind) -> u64 {
        self.blocks
            .iter()
            .filter(|b| b.kind == kind)
            .map(|b| b.steps)
            .sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.blocks {
            writeln!(
                f,
                "#{:<3} {:<20} {:<9} steps={:<8} emitted={:<8} {:?}",
                b.index, b.name, b.kind, b.steps, b.emitted, b.outcome
            )?;
        }
        Ok(())
    }
}
