//! Trace initialization by rejection sampling.

use std::rc::Rc;

use rand::RngCore;
use tracing::debug;

use crate::engine::{Context, Program};
use crate::error::{EngineError, Result};
use crate::graph::{Address, ChangeSet, ChoiceMap, Value};

/// A complete execution: the program's root node and its choice points.
#[derive(Debug, Clone)]
pub struct Trace {
    pub root: Address,
    pub choices: Rc<ChoiceMap>,
}

impl Trace {
    /// Current value of the root node.
    pub fn value(&self) -> Result<&Value> {
        self.choices.value(&self.root)
    }
}

/// Run `program` from scratch until one execution is not rejected.
///
/// Each attempt starts from an empty store. `max_attempts` bounds the
/// retries; `None` retries forever.
pub fn initialize<P>(
    program: &P,
    rng: &mut dyn RngCore,
    max_attempts: Option<usize>,
) -> Result<Trace>
where
    P: Program + ?Sized,
{
    let empty = ChoiceMap::new();
    let mut attempts = 0;
    loop {
        attempts += 1;
        if let Some((root, changes)) = attempt(program, &empty, &mut *rng)? {
            let mut choices = ChoiceMap::new();
            choices.apply(changes);
            debug!(attempts, nodes = choices.len(), "trace initialized");
            return Ok(Trace {
                root,
                choices: Rc::new(choices),
            });
        }
        debug!(attempts, "initial execution rejected, retrying");
        if max_attempts.is_some_and(|cap| attempts >= cap) {
            return Err(EngineError::InitializationExhausted(attempts));
        }
    }
}

fn attempt<P>(
    program: &P,
    empty: &ChoiceMap,
    rng: &mut dyn RngCore,
) -> Result<Option<(Address, ChangeSet)>>
where
    P: Program + ?Sized,
{
    let mut ctx = Context::new(empty, rng);
    let root = match program.run(&mut ctx) {
        Ok(root) => root,
        Err(err) if err.is_rejection() => return Ok(None),
        Err(err) => return Err(err),
    };
    if ctx.failed() {
        return Ok(None);
    }
    ctx.store_mut().node_mut(root.address())?.mark_root();
    ctx.collect_garbage()?;
    Ok(Some((root.address().clone(), ctx.into_store().into_changes())))
}
