use std::collections::HashMap;
use std::fmt;

/// What one extraction run accomplished, per type and overall.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records landed in the warehouse, per resource type.
    pub written: HashMap<String, u64>,
    /// Resources pulled from the source (before sink fanout).
    pub fetched: u64,
    /// Segments that failed permanently and were skipped; their resources
    /// are missing from this run and need a re-run.
    pub failed_segments: u64,
    /// Mirror uploads that succeeded / failed.
    pub uploaded: u64,
    pub upload_failures: u64,
    /// Whether the run was interrupted before draining every segment.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn total_written(&self) -> u64 {
        self.written.values().sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.written.iter().collect();
        types.sort_by_key(|(ty, _)| ty.as_str());
        for (ty, count) in types {
            writeln!(f, "  {ty}: {count} records")?;
        }
        write!(
            f,
            "  total: {} written, {} fetched, {} failed segments",
            self.total_written(),
            self.fetched,
            self.failed_segments
        )?;
        if self.uploaded + self.upload_failures > 0 {
            write!(
                f,
                ", {} mirrored ({} failed)",
                self.uploaded, self.upload_failures
            )?;
        }
        if self.cancelled {
            write!(f, " [interrupted]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_and_display() {
        let mut written = HashMap::new();
        written.insert("Patient".to_string(), 3);
        written.insert("Encounter".to_string(), 2);
        let summary = RunSummary {
            written,
            fetched: 5,
            failed_segments: 1,
            ..Default::default()
        };
        assert_eq!(summary.total_written(), 5);

        let text = summary.to_string();
        assert!(text.contains("Encounter: 2 records"));
        assert!(text.contains("5 written"));
        assert!(!text.contains("mirrored"));
    }

    #[test]
    fn test_display_mentions_mirror_when_used() {
        let summary = RunSummary {
            uploaded: 4,
            upload_failures: 1,
            ..Default::default()
        };
        assert!(summary.to_string().contains("4 mirrored (1 failed)"));
    }
}
