//! Per-vendor binding of translation and harvesting.
//!
//! The adapter owns one delivery's translator and harvester and runs
//! them with isolated failures: each harvest category is attempted in
//! order and its error, if any, is captured against the category name
//! rather than aborting the run.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::harvest::{Category, E2vHarvester, HarvestError, Harvester, ItlHarvester, Record};
use crate::translate::Translator;
use crate::Vendor;

/// One category's captured harvest failure.
#[derive(Debug)]
pub struct CategoryFailure {
    /// The category that failed.
    pub category: Category,
    /// The error it failed with.
    pub error: HarvestError,
}

/// Everything one ingest run produced.
#[derive(Debug)]
pub struct IngestOutcome {
    /// Harvested records, in category order.
    pub records: Vec<Record>,
    /// Categories that could not be harvested.
    pub failures: Vec<CategoryFailure>,
    /// Canonical files written by the translator, relative to the
    /// output base, in sorted order.
    pub outfiles: Vec<PathBuf>,
}

/// Binds a vendor's harvester and translator to one delivery.
pub struct VendorAdapter {
    vendor: Vendor,
    harvester: Box<dyn Harvester>,
    translator: Translator,
}

impl VendorAdapter {
    /// Creates the adapter for one delivery.
    pub fn new(
        vendor: Vendor,
        sensor_id: impl Into<String>,
        delivery_root: impl Into<PathBuf>,
        output_base: impl Into<PathBuf>,
    ) -> Self {
        let delivery_root = delivery_root.into();
        let harvester: Box<dyn Harvester> = match vendor {
            Vendor::Itl => Box::new(ItlHarvester::new(&delivery_root)),
            Vendor::E2v => Box::new(E2vHarvester::new(&delivery_root)),
        };
        let translator = Translator::new(vendor, sensor_id, delivery_root, output_base);
        VendorAdapter {
            vendor,
            harvester,
            translator,
        }
    }

    /// Assembles an adapter from an existing harvester and translator.
    pub fn from_parts(
        vendor: Vendor,
        harvester: Box<dyn Harvester>,
        translator: Translator,
    ) -> Self {
        VendorAdapter {
            vendor,
            harvester,
            translator,
        }
    }

    /// The vendor this adapter serves.
    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Harvests every category in order, capturing per-category errors.
    pub fn run_harvest(&mut self) -> (Vec<Record>, Vec<CategoryFailure>) {
        let mut records = Vec::new();
        let mut failures = Vec::new();
        for category in Category::ALL {
            match self.harvester.harvest(category) {
                Ok(mut harvested) => {
                    info!(%category, count = harvested.len(), "harvested");
                    records.append(&mut harvested);
                }
                Err(error) => failures.push(CategoryFailure { category, error }),
            }
        }
        if !failures.is_empty() {
            warn!(
                count = failures.len(),
                "failed to extract vendor results for some categories"
            );
            for failure in &failures {
                warn!(category = %failure.category, error = %failure.error, "category failed");
            }
        }
        (records, failures)
    }

    /// Runs the full ingest: harvest every category, then translate
    /// every image dataset.
    pub fn run_all(&mut self) -> IngestOutcome {
        let (records, failures) = self.run_harvest();
        self.translator.run_all();
        IngestOutcome {
            records,
            failures,
            outfiles: self.translator.outfiles().iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails only the traps category; every other category yields one
    /// fixed record.
    struct PartialHarvester;

    impl Harvester for PartialHarvester {
        fn harvest(&mut self, category: Category) -> Result<Vec<Record>, HarvestError> {
            match category {
                Category::Traps => Err(HarvestError::DocumentNotFound(
                    "traps.txt".to_string(),
                )),
                Category::Ptc => Ok(Vec::new()),
                _ => Ok(vec![Record::Traps {
                    amp: 1,
                    num_traps: 0,
                }]),
            }
        }
    }

    #[test]
    fn test_category_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let translator = Translator::new(
            Vendor::Itl,
            "ITL-3800C-089",
            dir.path(),
            dir.path().join("out"),
        );
        let mut adapter =
            VendorAdapter::from_parts(Vendor::Itl, Box::new(PartialHarvester), translator);
        let (records, failures) = adapter.run_harvest();

        // Ten producing categories (ptc is legitimately empty).
        assert_eq!(records.len(), 10);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].category, Category::Traps);
        assert!(matches!(
            failures[0].error,
            HarvestError::DocumentNotFound(_)
        ));
    }

    #[test]
    fn test_run_all_on_empty_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = VendorAdapter::new(
            Vendor::E2v,
            "e2v-CCD250-123",
            dir.path(),
            dir.path().join("out"),
        );
        let outcome = adapter.run_all();
        // Nothing to harvest or translate, but the run itself succeeds.
        assert!(outcome.records.is_empty());
        assert!(outcome.outfiles.is_empty());
        // Every document-backed category failed to resolve its table.
        assert_eq!(outcome.failures.len(), 11);
    }
}
