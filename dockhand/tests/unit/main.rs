//! Unit test suite

mod fakes;
mod test_coordinator;
mod test_server;
mod test_store;
