//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `balances` - Plantation balances (key: plantation_id)
//! - `listings` - Credit listings (key: listing_id)
//! - `trades` - Settled trades, append-only (key: trade_id)
//! - `idempotency` - Idempotency key -> trade_id (key: caller-supplied string)
//! - `indices` - Secondary indices for listing scans
//!
//! Every multi-row mutation commits through a single `WriteBatch`, so the
//! listing row, balance row, trade row, and idempotency mapping are durably
//! visible together or not at all.

use crate::{
    error::{Error, Result},
    types::{CreditListing, ListingStatus, PlantationBalance, Trade},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, DBIteratorWithThreadMode,
    IteratorMode, Options, WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_BALANCES: &str = "balances";
const CF_LISTINGS: &str = "listings";
const CF_TRADES: &str = "trades";
const CF_IDEMPOTENCY: &str = "idempotency";
const CF_INDICES: &str = "indices";

/// Index key namespace tags (first byte), so the two index shapes cannot
/// collide under prefix scans.
const IDX_STATUS: u8 = 1;
const IDX_PLANTATION: u8 = 2;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    // Column family handles are stored in DB, accessed by name
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_LISTINGS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_TRADES, Self::cf_options_append_only()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Self::cf_options_keyed()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_keyed()),
        ];

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_hot() -> Options {
        let mut opts = Options::default();
        // Balances and listings are read on every operation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_append_only() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_keyed() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Balance operations

    /// Insert a zeroed balance; fails if one already exists
    pub fn init_balance(&self, plantation_id: Uuid) -> Result<PlantationBalance> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let key = plantation_id.as_bytes();

        if self.db.get_cf(cf, key)?.is_some() {
            return Err(Error::AlreadyExists(plantation_id));
        }

        let balance = PlantationBalance::new(plantation_id);
        let value = bincode::serialize(&balance)?;
        self.db.put_cf(cf, key, &value)?;

        tracing::debug!(plantation_id = %plantation_id, "Balance initialized");

        Ok(balance)
    }

    /// Get balance by plantation ID
    pub fn get_balance(&self, plantation_id: Uuid) -> Result<PlantationBalance> {
        let cf = self.cf_handle(CF_BALANCES)?;

        let value = self
            .db
            .get_cf(cf, plantation_id.as_bytes())?
            .ok_or(Error::BalanceNotFound(plantation_id))?;

        let balance: PlantationBalance = bincode::deserialize(&value)?;
        Ok(balance)
    }

    /// Put balance (single-row mutation: credit/lock/unlock)
    pub fn put_balance(&self, balance: &PlantationBalance) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let value = bincode::serialize(balance)?;
        self.db.put_cf(cf, balance.plantation_id.as_bytes(), &value)?;
        Ok(())
    }

    // Listing operations

    /// Get listing by ID
    pub fn get_listing(&self, listing_id: Uuid) -> Result<CreditListing> {
        let cf = self.cf_handle(CF_LISTINGS)?;

        let value = self
            .db
            .get_cf(cf, listing_id.as_bytes())?
            .ok_or(Error::ListingNotFound(listing_id))?;

        let listing: CreditListing = bincode::deserialize(&value)?;
        Ok(listing)
    }

    /// Insert a new listing together with the locked balance (atomic)
    pub fn create_listing_atomic(
        &self,
        listing: &CreditListing,
        balance: &PlantationBalance,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        self.batch_put_listing(&mut batch, listing)?;
        self.batch_put_balance(&mut batch, balance)?;

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::index_key_status(listing.status, listing.listing_id),
            [],
        );
        batch.put_cf(
            cf_indices,
            Self::index_key_plantation(listing.plantation_id, listing.listing_id),
            [],
        );

        self.db.write(batch)?;

        tracing::debug!(
            listing_id = %listing.listing_id,
            plantation_id = %listing.plantation_id,
            credits = listing.total_credits,
            "Listing created"
        );

        Ok(())
    }

    /// Commit a trade fill: listing update, balance consumption, trade row,
    /// and idempotency mapping in one batch.
    pub fn settle_trade_atomic(
        &self,
        listing: &CreditListing,
        previous_status: ListingStatus,
        balance: &PlantationBalance,
        trade: &Trade,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        self.batch_put_listing(&mut batch, listing)?;
        self.batch_put_balance(&mut batch, balance)?;
        self.batch_move_status_index(&mut batch, listing, previous_status)?;

        let cf_trades = self.cf_handle(CF_TRADES)?;
        batch.put_cf(
            cf_trades,
            trade.trade_id.as_bytes(),
            bincode::serialize(trade)?,
        );

        let cf_idempotency = self.cf_handle(CF_IDEMPOTENCY)?;
        batch.put_cf(
            cf_idempotency,
            trade.idempotency_key.as_bytes(),
            trade.trade_id.as_bytes(),
        );

        self.db.write(batch)?;

        tracing::debug!(
            trade_id = %trade.trade_id,
            listing_id = %listing.listing_id,
            credits = trade.credits,
            "Trade settled"
        );

        Ok(())
    }

    /// Commit a listing cancellation with the unlocked balance (atomic)
    pub fn cancel_listing_atomic(
        &self,
        listing: &CreditListing,
        previous_status: ListingStatus,
        balance: &PlantationBalance,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        self.batch_put_listing(&mut batch, listing)?;
        self.batch_put_balance(&mut batch, balance)?;
        self.batch_move_status_index(&mut batch, listing, previous_status)?;

        self.db.write(batch)?;

        tracing::debug!(listing_id = %listing.listing_id, "Listing cancelled");

        Ok(())
    }

    // Trade operations

    /// Get trade by ID
    pub fn get_trade(&self, trade_id: Uuid) -> Result<Trade> {
        let cf = self.cf_handle(CF_TRADES)?;

        let value = self
            .db
            .get_cf(cf, trade_id.as_bytes())?
            .ok_or(Error::TradeNotFound(trade_id))?;

        let trade: Trade = bincode::deserialize(&value)?;
        Ok(trade)
    }

    /// Look up a previously settled trade by idempotency key.
    ///
    /// The trade row is the source of truth; a dangling mapping (key present,
    /// trade absent) is corruption and surfaces as `InvariantViolation`.
    pub fn lookup_idempotency(&self, key: &str) -> Result<Option<Trade>> {
        let cf = self.cf_handle(CF_IDEMPOTENCY)?;

        let value = match self.db.get_cf(cf, key.as_bytes())? {
            Some(value) => value,
            None => return Ok(None),
        };

        let trade_id_bytes: [u8; 16] = value.as_slice().try_into().map_err(|_| {
            Error::InvariantViolation(format!("malformed idempotency mapping for key {:?}", key))
        })?;
        let trade_id = Uuid::from_bytes(trade_id_bytes);

        match self.get_trade(trade_id) {
            Ok(trade) => Ok(Some(trade)),
            Err(Error::TradeNotFound(_)) => Err(Error::InvariantViolation(format!(
                "idempotency key {:?} maps to missing trade {}",
                key, trade_id
            ))),
            Err(e) => Err(e),
        }
    }

    // Listing scans

    /// Lazy, restartable iterator over open listings, optionally filtered by
    /// plantation.
    pub fn open_listings(&self, plantation_id: Option<Uuid>) -> Result<OpenListings<'_>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let prefixes: Vec<Vec<u8>> = match plantation_id {
            Some(plantation_id) => {
                let mut prefix = vec![IDX_PLANTATION];
                prefix.extend_from_slice(plantation_id.as_bytes());
                vec![prefix]
            }
            None => vec![
                vec![IDX_STATUS, ListingStatus::Active as u8],
                vec![IDX_STATUS, ListingStatus::PartiallyFilled as u8],
            ],
        };

        Ok(OpenListings {
            storage: self,
            prefixes,
            current: None,
            cursor: 0,
        })
    }

    // Batch helpers

    fn batch_put_listing(&self, batch: &mut WriteBatch, listing: &CreditListing) -> Result<()> {
        let cf = self.cf_handle(CF_LISTINGS)?;
        batch.put_cf(cf, listing.listing_id.as_bytes(), bincode::serialize(listing)?);
        Ok(())
    }

    fn batch_put_balance(&self, batch: &mut WriteBatch, balance: &PlantationBalance) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCES)?;
        batch.put_cf(cf, balance.plantation_id.as_bytes(), bincode::serialize(balance)?);
        Ok(())
    }

    fn batch_move_status_index(
        &self,
        batch: &mut WriteBatch,
        listing: &CreditListing,
        previous_status: ListingStatus,
    ) -> Result<()> {
        if previous_status == listing.status {
            return Ok(());
        }
        let cf = self.cf_handle(CF_INDICES)?;
        batch.delete_cf(cf, Self::index_key_status(previous_status, listing.listing_id));
        batch.put_cf(cf, Self::index_key_status(listing.status, listing.listing_id), []);
        Ok(())
    }

    // Index key helpers

    fn index_key_status(status: ListingStatus, listing_id: Uuid) -> Vec<u8> {
        let mut key = vec![IDX_STATUS, status as u8];
        key.extend_from_slice(listing_id.as_bytes());
        key
    }

    fn index_key_plantation(plantation_id: Uuid, listing_id: Uuid) -> Vec<u8> {
        let mut key = vec![IDX_PLANTATION];
        key.extend_from_slice(plantation_id.as_bytes());
        key.extend_from_slice(listing_id.as_bytes());
        key
    }

    fn raw_index_iter(&self, prefix: &[u8]) -> Result<DBIteratorWithThreadMode<'_, DB>> {
        let cf = self.cf_handle(CF_INDICES)?;
        Ok(self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, rocksdb::Direction::Forward)))
    }
}

/// Iterator over open listings, driven by the secondary indices.
///
/// Listings are loaded one at a time as the iterator advances; calling
/// [`Storage::open_listings`] again restarts the scan from the beginning.
pub struct OpenListings<'a> {
    storage: &'a Storage,
    prefixes: Vec<Vec<u8>>,
    current: Option<DBIteratorWithThreadMode<'a, DB>>,
    cursor: usize,
}

impl OpenListings<'_> {
    fn next_listing_id(&mut self) -> Result<Option<(Uuid, bool)>> {
        loop {
            if self.current.is_none() {
                if self.cursor >= self.prefixes.len() {
                    return Ok(None);
                }
                let iter = self.storage.raw_index_iter(&self.prefixes[self.cursor])?;
                self.current = Some(iter);
            }

            let prefix = &self.prefixes[self.cursor];
            let filtered = prefix[0] == IDX_PLANTATION;

            if let Some(iter) = self.current.as_mut() {
                match iter.next() {
                    Some(item) => {
                        let (key, _) = item?;
                        // Iteration runs past the prefix range; stop there
                        if !key.starts_with(prefix) {
                            self.current = None;
                            self.cursor += 1;
                            continue;
                        }
                        // listing_id occupies the trailing 16 bytes of both
                        // index key shapes
                        if key.len() < prefix.len() + 16 {
                            return Err(Error::Storage(format!(
                                "malformed index key of {} bytes",
                                key.len()
                            )));
                        }
                        let id_bytes: [u8; 16] =
                            key[key.len() - 16..].try_into().map_err(|_| {
                                Error::Storage(format!(
                                    "malformed index key of {} bytes",
                                    key.len()
                                ))
                            })?;
                        return Ok(Some((Uuid::from_bytes(id_bytes), filtered)));
                    }
                    None => {
                        self.current = None;
                        self.cursor += 1;
                    }
                }
            }
        }
    }
}

impl Iterator for OpenListings<'_> {
    type Item = Result<CreditListing>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (listing_id, needs_status_filter) = match self.next_listing_id() {
                Ok(Some(found)) => found,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };

            let listing = match self.storage.get_listing(listing_id) {
                Ok(listing) => listing,
                Err(e) => return Some(Err(e)),
            };

            // The plantation index covers all statuses; skip closed listings
            if needs_status_filter && !listing.is_open() {
                continue;
            }

            return Some(Ok(listing));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_listing(plantation_id: Uuid, credits: u64) -> CreditListing {
        CreditListing::new(plantation_id, Uuid::new_v4(), credits, Decimal::new(2, 0)).unwrap()
    }

    #[test]
    fn test_init_balance_once() {
        let (storage, _temp) = test_storage();
        let plantation_id = Uuid::new_v4();

        let balance = storage.init_balance(plantation_id).unwrap();
        assert_eq!(balance.total_credits, 0);

        let err = storage.init_balance(plantation_id).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_balance_roundtrip() {
        let (storage, _temp) = test_storage();
        let plantation_id = Uuid::new_v4();

        let mut balance = storage.init_balance(plantation_id).unwrap();
        balance.credit(100).unwrap();
        storage.put_balance(&balance).unwrap();

        let loaded = storage.get_balance(plantation_id).unwrap();
        assert_eq!(loaded, balance);
    }

    #[test]
    fn test_get_balance_missing() {
        let (storage, _temp) = test_storage();
        let err = storage.get_balance(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::BalanceNotFound(_)));
    }

    #[test]
    fn test_create_listing_atomic_roundtrip() {
        let (storage, _temp) = test_storage();
        let plantation_id = Uuid::new_v4();

        let mut balance = storage.init_balance(plantation_id).unwrap();
        balance.credit(100).unwrap();
        balance.lock(40).unwrap();

        let listing = test_listing(plantation_id, 40);
        storage.create_listing_atomic(&listing, &balance).unwrap();

        let loaded = storage.get_listing(listing.listing_id).unwrap();
        assert_eq!(loaded, listing);

        let loaded_balance = storage.get_balance(plantation_id).unwrap();
        assert_eq!(loaded_balance.locked_credits, 40);
    }

    #[test]
    fn test_settle_trade_atomic_and_idempotency_lookup() {
        let (storage, _temp) = test_storage();
        let plantation_id = Uuid::new_v4();

        let mut balance = storage.init_balance(plantation_id).unwrap();
        balance.credit(100).unwrap();
        balance.lock(40).unwrap();

        let mut listing = test_listing(plantation_id, 40);
        storage.create_listing_atomic(&listing, &balance).unwrap();

        let previous_status = listing.status;
        listing.fill(40).unwrap();
        balance.consume_locked(40).unwrap();

        let trade = Trade {
            trade_id: Uuid::now_v7(),
            listing_id: listing.listing_id,
            buyer_id: Uuid::new_v4(),
            credits: 40,
            total_price: Decimal::new(80, 0),
            idempotency_key: "k1".to_string(),
            executed_at: chrono::Utc::now(),
        };

        storage
            .settle_trade_atomic(&listing, previous_status, &balance, &trade)
            .unwrap();

        let found = storage.lookup_idempotency("k1").unwrap().unwrap();
        assert_eq!(found, trade);

        assert!(storage.lookup_idempotency("k2").unwrap().is_none());

        let loaded = storage.get_listing(listing.listing_id).unwrap();
        assert_eq!(loaded.status, ListingStatus::Filled);
        assert_eq!(loaded.remaining_credits, 0);
    }

    #[test]
    fn test_open_listings_scan() {
        let (storage, _temp) = test_storage();
        let plantation_a = Uuid::new_v4();
        let plantation_b = Uuid::new_v4();

        for plantation_id in [plantation_a, plantation_b] {
            let mut balance = storage.init_balance(plantation_id).unwrap();
            balance.credit(100).unwrap();
            balance.lock(30).unwrap();
            let listing = test_listing(plantation_id, 30);
            storage.create_listing_atomic(&listing, &balance).unwrap();
        }

        let all: Vec<_> = storage
            .open_listings(None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(all.len(), 2);

        let only_a: Vec<_> = storage
            .open_listings(Some(plantation_a))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].plantation_id, plantation_a);

        // Restartable: a second scan sees the same listings
        let again: Vec<_> = storage
            .open_listings(None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn test_open_listings_excludes_terminal() {
        let (storage, _temp) = test_storage();
        let plantation_id = Uuid::new_v4();

        let mut balance = storage.init_balance(plantation_id).unwrap();
        balance.credit(100).unwrap();
        balance.lock(30).unwrap();
        let mut listing = test_listing(plantation_id, 30);
        storage.create_listing_atomic(&listing, &balance).unwrap();

        let previous_status = listing.status;
        let unlocked = listing.cancel().unwrap();
        balance.unlock(unlocked).unwrap();
        storage
            .cancel_listing_atomic(&listing, previous_status, &balance)
            .unwrap();

        let open: Vec<_> = storage
            .open_listings(None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(open.is_empty());

        let by_plantation: Vec<_> = storage
            .open_listings(Some(plantation_id))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(by_plantation.is_empty());
    }
}
