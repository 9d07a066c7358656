//! Test doubles for the scan oracle and the clock.
//!
//! Enabled for this crate's own tests and, through the `test-support` feature, for the
//! dev-dependencies of downstream crates.

use crate::antivirus::{ScanError, ScanOracle, ScanVerdict};
use crate::clock::Clock;
use chrono::{Days, NaiveDate};
use std::io::Read;
use std::sync::Mutex;

#[derive(Default)]
struct Script {
    signatures: Vec<(Vec<u8>, String)>,
    unavailable: bool,
    scans: usize,
}

/// A scan oracle driven by a list of byte patterns.
///
/// Content containing a flagged pattern is reported as infected with the pattern's
/// signature name. The list can change between calls, which simulates a signature database
/// update between write and read.
#[derive(Default)]
pub struct ScriptedScanner {
    script: Mutex<Script>,
}

impl ScriptedScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(&self, pattern: impl AsRef<[u8]>, signature: impl Into<String>) {
        self.lock()
            .signatures
            .push((pattern.as_ref().to_vec(), signature.into()));
    }

    pub fn clear(&self) {
        self.lock().signatures.clear();
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Number of scans performed so far.
    pub fn scans(&self) -> usize {
        self.lock().scans
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ScanOracle for ScriptedScanner {
    fn scan(&self, source: &mut dyn Read) -> Result<ScanVerdict, ScanError> {
        let mut content = Vec::new();
        source.read_to_end(&mut content)?;

        let mut script = self.lock();
        script.scans += 1;
        if script.unavailable {
            return Err(ScanError::Unavailable("scripted outage".into()));
        }

        let hit = script.signatures.iter().find(|(pattern, _)| {
            !pattern.is_empty() && content.windows(pattern.len()).any(|w| w == pattern.as_slice())
        });
        Ok(match hit {
            Some((_, signature)) => ScanVerdict::Infected(signature.clone()),
            None => ScanVerdict::Clean,
        })
    }
}

/// A clock stuck on a settable date.
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.lock().unwrap_or_else(|p| p.into_inner()) = today;
    }

    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(later) = today.checked_add_days(Days::new(days)) {
            *today = later;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|p| p.into_inner())
    }
}
