//! Decide whether a derived file has to be rebuilt.

use log::debug;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// True if `force` is set, `output` does not exist, or any of `inputs` is strictly
/// newer than `output`. Inputs that do not exist never make the output stale.
pub fn needs_update<P: AsRef<Path>>(output: &Path, inputs: &[P], force: bool) -> bool {
    if force {
        return true;
    }
    let Some(output_time) = modified(output) else {
        debug!("{} does not exist", output.display());
        return true;
    };
    inputs.iter().any(|input| {
        let input = input.as_ref();
        let newer = modified(input).is_some_and(|t| t > output_time);
        if newer {
            debug!("{} is newer than {}", input.display(), output.display());
        }
        newer
    })
}
