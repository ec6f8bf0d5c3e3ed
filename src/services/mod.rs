// Service exports
pub mod geo_index;
pub mod postgres;
pub mod signal_log;
pub mod stores;

pub use geo_index::{GeoKey, RedisGeoIndex};
pub use postgres::PostgresSignalStore;
pub use signal_log::HttpSignalLog;
pub use stores::{GeoHit, GeoIndex, SignalLog, SpatialStore, StoreError};
