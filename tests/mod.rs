mod support;

mod retry_tests;
