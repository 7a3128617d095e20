#![no_main]
use libfuzzer_sys::fuzz_target;

use rtc_rtcp::extended_report::ReportBlock;

fuzz_target!(|data: &[u8]| {
    let mut buf = data;
    let _ = ReportBlock::unmarshal_all(&mut buf);
});
