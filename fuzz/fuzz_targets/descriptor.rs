#![no_main]

use ferrous_beans::discovery::ExcludeFilter;
use ferrous_beans::BeansConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Arbitrary descriptors either parse or fail with a config error
    if let Ok(config) = BeansConfig::from_json(text) {
        let json = config.to_json().expect("parsed descriptors serialize");
        assert_eq!(BeansConfig::from_json(&json).ok(), Some(config.clone()));
        for exclude in &config.scan.exclude {
            if let Ok(filter) = ExcludeFilter::compile(exclude) {
                let _ = filter.matches_name("com.acme.Service");
            }
        }
    }
});
