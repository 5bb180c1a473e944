pub mod mock;

pub use mock::{lexical_sentiment, MockFastProducer, MockSlowProducer};
