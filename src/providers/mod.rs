pub mod gtfs;
