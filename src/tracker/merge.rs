//! Streaming merge of the durable file with overlay changes
//!
//! Both inputs are ascending. On equal keys the overlay value replaces the
//! stored one. Results equal to zero are dropped, which is how counts that
//! fell back to zero disappear from the next file.

use std::iter::Peekable;

use crate::error::Result;
use crate::key::{CountsKey, CountsValue};

/// Merge `stored` and `overlay` into one ascending stream passed to `emit`
pub fn merge_sorted<S, O, F>(stored: S, overlay: O, mut emit: F) -> Result<()>
where
    S: IntoIterator<Item = Result<(CountsKey, CountsValue)>>,
    O: IntoIterator<Item = (CountsKey, CountsValue)>,
    F: FnMut(CountsKey, CountsValue) -> Result<()>,
{
    let mut overlay = overlay.into_iter().peekable();

    for entry in stored {
        let (key, value) = entry?;
        drain_before(&mut overlay, &key, &mut emit)?;

        match overlay.peek() {
            Some(&(overlay_key, overlay_value)) if overlay_key == key => {
                overlay.next();
                emit_non_zero(overlay_key, overlay_value, &mut emit)?;
            }
            _ => emit_non_zero(key, value, &mut emit)?,
        }
    }

    for (key, value) in overlay {
        emit_non_zero(key, value, &mut emit)?;
    }
    Ok(())
}

/// Emit overlay entries sorting strictly before `key`
fn drain_before<O, F>(overlay: &mut Peekable<O>, key: &CountsKey, emit: &mut F) -> Result<()>
where
    O: Iterator<Item = (CountsKey, CountsValue)>,
    F: FnMut(CountsKey, CountsValue) -> Result<()>,
{
    while let Some(&(overlay_key, overlay_value)) = overlay.peek() {
        if overlay_key >= *key {
            break;
        }
        overlay.next();
        emit_non_zero(overlay_key, overlay_value, emit)?;
    }
    Ok(())
}

fn emit_non_zero<F>(key: CountsKey, value: CountsValue, emit: &mut F) -> Result<()>
where
    F: FnMut(CountsKey, CountsValue) -> Result<()>,
{
    if value.is_zero() {
        return Ok(());
    }
    emit(key, value)
}
