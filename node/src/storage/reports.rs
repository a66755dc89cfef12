use anyhow::Result;
use hamrokotha_fraud_core::ReportStatus;
use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;

use super::{decode, encode, encode_tx, tx_error, NodeStorage};
use crate::fraud::{ReportId, ReportRecord, ReportTarget};

type TxResult<T> = ConflictableTransactionResult<T, anyhow::Error>;

const ID_LEN: usize = 16;

fn target_key(target: &ReportTarget, report: &ReportId) -> Vec<u8> {
    let mut key = target.key();
    key.extend_from_slice(report.as_bytes());
    key
}

impl NodeStorage {
    /// Writes a report and its target index entry together.
    pub fn insert_report(&self, report: &ReportRecord) -> Result<()> {
        let reports = self.tree(Self::REPORTS)?;
        let targets = self.tree(Self::REPORT_TARGETS)?;
        let index_key = target_key(&report.target, &report.id);

        (&reports, &targets)
            .transaction(|(reports, targets)| -> TxResult<()> {
                reports.insert(&report.id.as_bytes()[..], encode_tx(report)?)?;
                targets.insert(&index_key[..], Vec::<u8>::new())?;
                Ok(())
            })
            .map_err(tx_error)?;
        reports.flush()?;
        Ok(())
    }

    pub fn report(&self, id: ReportId) -> Result<Option<ReportRecord>> {
        let tree = self.tree(Self::REPORTS)?;
        tree.get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Reports filed against `target`, newest first.
    pub fn reports_for(&self, target: &ReportTarget) -> Result<Vec<ReportRecord>> {
        let targets = self.tree(Self::REPORT_TARGETS)?;
        let prefix = target.key();
        let mut found = Vec::new();
        for entry in targets.scan_prefix(&prefix).keys() {
            let key = entry?;
            let id = key
                .get(prefix.len()..prefix.len() + ID_LEN)
                .and_then(ReportId::from_slice);
            let Some(id) = id else {
                continue;
            };
            if let Some(report) = self.report(id)? {
                found.push(report);
            }
        }
        found.sort_by(|a, b| b.created_ms.cmp(&a.created_ms));
        Ok(found)
    }

    /// Every report, newest first, optionally only those in `status`.
    pub fn reports(&self, status: Option<ReportStatus>) -> Result<Vec<ReportRecord>> {
        let tree = self.tree(Self::REPORTS)?;
        let mut found = Vec::new();
        for value in tree.iter().values() {
            let report: ReportRecord = decode(&value?)?;
            if status.map_or(true, |status| report.status == status) {
                found.push(report);
            }
        }
        found.sort_by(|a, b| b.created_ms.cmp(&a.created_ms));
        Ok(found)
    }

    /// Read-modify-write of a single report, written back only when changed.
    pub fn update_report<T>(
        &self,
        id: ReportId,
        mut apply: impl FnMut(&mut ReportRecord) -> T,
    ) -> Result<Option<(ReportRecord, T)>> {
        let tree = self.tree(Self::REPORTS)?;
        let key = id.as_bytes();
        loop {
            let Some(current) = tree.get(key)? else {
                return Ok(None);
            };
            let original: ReportRecord = decode(&current)?;
            let mut updated = original.clone();
            let outcome = apply(&mut updated);
            if updated == original {
                return Ok(Some((updated, outcome)));
            }
            if tree
                .compare_and_swap(key, Some(&current), Some(encode(&updated)?))?
                .is_ok()
            {
                tree.flush()?;
                return Ok(Some((updated, outcome)));
            }
        }
    }
}
