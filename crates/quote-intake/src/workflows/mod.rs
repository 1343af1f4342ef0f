pub mod quote_requests;
