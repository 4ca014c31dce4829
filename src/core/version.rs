use std::cmp::Ordering;

use tracing::warn;

use crate::error::ModsyncError;

/// What to do with a mod after comparing the version on the site with the one we last installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Remote and local versions match, nothing to download
    UpToDate,
    /// The local copy claims to be newer than the site's
    StaleLocal,
    /// Remote is newer or we've never installed this mod
    NeedsUpdate,
}

/// Split a version into its numeric segments with leading zeros removed
///
/// Segments stay as digit strings so there is no upper bound on their size
fn segments(version: &str) -> Result<Vec<&str>, ModsyncError> {
    version
        .split('.')
        .map(|s| {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ModsyncError::InvalidVersion(version.to_owned()));
            }
            Ok(s.trim_start_matches('0'))
        })
        .collect()
}

/// Numeric ordering of two digit strings without leading zeros
fn cmp_segment(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

// zero with its leading zeros stripped is the empty string
fn padded<'a>(v: &[&'a str], i: usize) -> &'a str {
    v.get(i).copied().unwrap_or("")
}

/// Compare two dotted version strings numerically
///
/// The shorter version is padded with zeros, so `1.2` and `1.2.0` are equal
///
/// # Errors
/// * `InvalidVersion` if any segment of either string isn't a non-negative integer
pub fn compare(a: impl AsRef<str>, b: impl AsRef<str>) -> Result<Ordering, ModsyncError> {
    let a = segments(a.as_ref())?;
    let b = segments(b.as_ref())?;
    let len = a.len().max(b.len());

    for i in 0..len {
        match cmp_segment(padded(&a, i), padded(&b, i)) {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }

    Ok(Ordering::Equal)
}

/// Decide whether a mod needs downloading
/// # Params
/// * observed - version currently published on the site
/// * stored - version recorded after the last successful download, if any
///
/// A stored version that can't be parsed is treated as missing
///
/// # Errors
/// * `InvalidVersion` if `observed` isn't a valid version string
pub fn decide(observed: &str, stored: Option<&str>) -> Result<Decision, ModsyncError> {
    segments(observed)?;
    let Some(stored) = stored else {
        return Ok(Decision::NeedsUpdate);
    };

    match compare(observed, stored) {
        Ok(Ordering::Equal) => Ok(Decision::UpToDate),
        Ok(Ordering::Less) => Ok(Decision::StaleLocal),
        Ok(Ordering::Greater) => Ok(Decision::NeedsUpdate),
        Err(e) => {
            warn!("Ignoring stored version: {}", e);
            Ok(Decision::NeedsUpdate)
        }
    }
}
