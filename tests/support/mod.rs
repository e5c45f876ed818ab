pub mod fake_document;
pub mod fake_kv;
