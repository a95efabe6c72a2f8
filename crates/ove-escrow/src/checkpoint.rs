//! Checkpoint engine.
//!
//! Brings the global history up to the current block, one synthetic point
//! per elapsed week boundary, then folds in a user's lock change. Runs as
//! part of every lock mutation and cannot fail.

use ove_core::constants::{floor_week, MAX_CHECKPOINT_WEEKS, MULTIPLIER, WEEK};
use ove_core::types::{Address, BlockContext, LockedBalance};
use ove_decay::{Checkpoints, Point};
use tracing::debug;

/// A user's lock before and after the mutation being checkpointed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LockChange<'a> {
    pub user: &'a Address,
    pub old: LockedBalance,
    pub new: LockedBalance,
}

fn clamp(point: &mut Point) {
    point.bias = point.bias.max(0);
    point.slope = point.slope.min(0);
}

/// Record a checkpoint at `ctx`, applying `change` if given.
pub(crate) fn checkpoint(cp: &mut Checkpoints, change: Option<LockChange<'_>>, ctx: &BlockContext) {
    let now = ctx.timestamp;
    let (u_old, u_new) = match &change {
        Some(c) => (Point::for_lock(&c.old, ctx), Point::for_lock(&c.new, ctx)),
        None => (Point::EMPTY, Point::EMPTY),
    };

    let mut last = cp
        .global()
        .latest()
        .copied()
        .unwrap_or_else(|| Point::zero_at(ctx));
    let initial = last;
    let block_slope = if now > initial.timestamp {
        MULTIPLIER * ctx.number.saturating_sub(initial.block) as u128
            / (now - initial.timestamp) as u128
    } else {
        0
    };

    // Replay week boundaries up to now.
    let mut t_i = floor_week(last.timestamp);
    let mut reached_now = false;
    let mut synthetic = 0u64;
    for _ in 0..MAX_CHECKPOINT_WEEKS {
        t_i += WEEK;
        let d_slope = if t_i > now {
            t_i = now;
            0
        } else {
            cp.schedule().get(t_i)
        };
        last.bias = last.raw_value_at(t_i);
        last.slope -= d_slope;
        clamp(&mut last);
        last.timestamp = t_i;
        let since = t_i.saturating_sub(initial.timestamp) as u128;
        last.block = initial.block + (block_slope * since / MULTIPLIER) as u64;
        if t_i == now {
            last.block = ctx.number;
            reached_now = true;
            break;
        }
        cp.global_mut().append(last);
        synthetic += 1;
    }
    if !reached_now {
        // Every lock has expired after the replay cap; decay the rest directly.
        last.bias = last.raw_value_at(now);
        clamp(&mut last);
        last.timestamp = now;
        last.block = ctx.number;
    }

    if change.is_some() {
        last.slope += u_new.slope - u_old.slope;
        last.bias += u_new.bias - u_old.bias;
        clamp(&mut last);
    }
    let epoch = cp.global_mut().append(last);
    debug!(epoch, synthetic, bias = last.bias, slope = last.slope, "global checkpoint");

    let Some(c) = change else {
        return;
    };

    // Move the user's slope from the old expiry to the new one.
    let schedule = cp.schedule_mut();
    if c.old.unlock_time > now {
        let mut old_d = schedule.get(c.old.unlock_time);
        old_d -= u_old.slope;
        if c.new.unlock_time == c.old.unlock_time {
            old_d += u_new.slope;
        }
        schedule.set(c.old.unlock_time, old_d);
    }
    if c.new.unlock_time > now && c.new.unlock_time > c.old.unlock_time {
        let new_d = schedule.get(c.new.unlock_time) + u_new.slope;
        schedule.set(c.new.unlock_time, new_d);
    }

    cp.user_mut(c.user).append(u_new);
}
