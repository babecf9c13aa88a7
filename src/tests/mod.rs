// Test modules for StaySync
// Each module covers one source module; shared fixtures live in helpers

mod helpers;

mod storage_tests;
