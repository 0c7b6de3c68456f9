//! Safe-ish conversions between rust and sql types.

use super::*;

pub fn i64_to_u64(i: i64) -> Result<u64> {
    u64::try_from(i).map_err(|_| anyhow!("i64 value {i} is negative and cannot be converted to u64"))
}

pub fn usize_to_i64(i: usize) -> Result<i64> {
    i64::try_from(i).map_err(|_| anyhow!("usize value {i} exceeds i64::MAX"))
}
