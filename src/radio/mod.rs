pub mod adapter;

pub use adapter::{
    AdapterError, PowerCallback, PowerState, PowerSubscription, RadioAdapter, ScanCallback,
    ScanEvent, ScanHandle,
};
