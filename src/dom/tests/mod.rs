mod query_tests;
mod xpath_tests;
