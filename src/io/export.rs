use anyhow::Result;
use std::io::Write;

use crate::application::{LedgerService, Page};
use crate::domain::{AccountId, Entry, Transfer};

/// Page size used when walking a full account history
const EXPORT_BATCH: i64 = 500;

/// Exporter for writing an account's ledger history as CSV
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export every entry of an account, oldest first.
    pub async fn export_entries_csv<W: Write>(
        &self,
        account_id: AccountId,
        writer: W,
    ) -> Result<usize> {
        let entries = self.all_entries(account_id).await?;
        write_entries_csv(&entries, writer)
    }

    /// Export every transfer touching an account, oldest first.
    pub async fn export_transfers_csv<W: Write>(
        &self,
        account_id: AccountId,
        writer: W,
    ) -> Result<usize> {
        let mut transfers = Vec::new();
        let mut page = Page {
            limit: EXPORT_BATCH,
            offset: 0,
        };
        loop {
            let batch = self
                .service
                .list_transfers(account_id, account_id, page)
                .await?;
            let done = (batch.len() as i64) < page.limit;
            transfers.extend(batch);
            if done {
                break;
            }
            page.offset += page.limit;
        }
        write_transfers_csv(&transfers, writer)
    }

    async fn all_entries(&self, account_id: AccountId) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        let mut page = Page {
            limit: EXPORT_BATCH,
            offset: 0,
        };
        loop {
            let batch = self.service.list_entries(account_id, page).await?;
            let done = (batch.len() as i64) < page.limit;
            entries.extend(batch);
            if done {
                break;
            }
            page.offset += page.limit;
        }
        Ok(entries)
    }
}

/// Write entries as CSV with a header row. Returns the number of rows written.
pub fn write_entries_csv<W: Write>(entries: &[Entry], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["id", "account_id", "amount", "created_at"])?;

    for entry in entries {
        csv_writer.write_record(&[
            entry.id.to_string(),
            entry.account_id.to_string(),
            entry.amount.to_string(),
            entry.created_at.to_rfc3339(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(entries.len())
}

/// Write transfers as CSV with a header row. Returns the number of rows written.
pub fn write_transfers_csv<W: Write>(transfers: &[Transfer], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["id", "from_account_id", "to_account_id", "amount", "created_at"])?;

    for transfer in transfers {
        csv_writer.write_record(&[
            transfer.id.to_string(),
            transfer.from_account_id.to_string(),
            transfer.to_account_id.to_string(),
            transfer.amount.to_string(),
            transfer.created_at.to_rfc3339(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(transfers.len())
}
