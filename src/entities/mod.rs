pub mod film_record_cache;
pub mod share_snapshot;
