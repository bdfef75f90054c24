#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate mdns_core;

fuzz_target!(|data: &[u8]| {
    #[allow(unused_must_use)]
    {
        mdns_core::Message::from_slice(data);
    }
});
