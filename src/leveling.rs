//! XP thresholds and the level-up carry.

use crate::error::{Result, StoreError};

/// Largest XP amount accepted by a single grant.
pub const MAX_XP_GRANT: u64 = 1_000_000;

/// XP needed to advance from `level` to `level + 1`: `ceil(50 + (2 * level)^1.3)`.
pub fn xp_for_next_level(level: u32) -> u64 {
    let scaled = (f64::from(level) * 2.0).powf(1.3);
    (50.0 + scaled).ceil() as u64
}

/// Rejects grants above [`MAX_XP_GRANT`].
pub fn check_grant(xp: u64) -> Result<()> {
    if xp > MAX_XP_GRANT {
        return Err(StoreError::XpOutOfRange {
            xp,
            max: MAX_XP_GRANT,
        });
    }
    Ok(())
}

/// Outcome of applying a grant to a `(level, xp_to_next)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub level: u32,
    pub xp_to_next: i64,
}

impl Progress {
    /// Subtracts `xp` and carries any overflow through as many levels as it clears.
    /// The returned `xp_to_next` is always positive.
    pub fn grant(self, xp: u64) -> Result<Self> {
        check_grant(xp)?;

        let mut level = self.level;
        let mut xp_to_next = self.xp_to_next - xp as i64;
        while xp_to_next <= 0 {
            level = level
                .checked_add(1)
                .ok_or(StoreError::LevelOverflow(self.level))?;
            // xp_to_next is the (non-positive) overflow past the previous threshold
            xp_to_next += xp_for_next_level(level) as i64;
        }

        Ok(Self { level, xp_to_next })
    }
}
