#![no_main]

use ferrous_beans::{BeanBuilder, BeanError, ContainerBuilder, Qualifier};
use libfuzzer_sys::fuzz_target;

const QUALIFIERS: [&str; 4] = ["Fast", "Safe", "Cheap", "Local"];

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // Each byte declares one bean: the low bits pick qualifiers, the high bits
    // make it an alternative and choose its priority.
    let mut builder = ContainerBuilder::new();
    for (i, byte) in data.iter().take(16).enumerate() {
        let mut bean = BeanBuilder::new(format!("Impl{}", i))
            .types(&["Service"])
            .constructor(vec![], move |_| Ok(i));
        for (bit, name) in QUALIFIERS.iter().enumerate() {
            if byte & (1 << bit) != 0 {
                bean = bean.qualifier(Qualifier::new(*name));
            }
        }
        if byte & 0x10 != 0 {
            bean = bean.alternative().priority(i32::from(byte >> 5));
        }
        builder = builder.bean(bean);
    }
    let Ok(container) = builder.start() else {
        return;
    };

    let wanted: Vec<Qualifier> = QUALIFIERS
        .iter()
        .enumerate()
        .filter(|(bit, _)| data[0] & (1 << bit) != 0)
        .map(|(_, name)| Qualifier::new(*name))
        .collect();

    // Resolution is a pure function of the deployment
    let first = container.resolve("Service", &wanted).map(|b| b.display());
    let second = container.resolve("Service", &wanted).map(|b| b.display());
    match (first, second) {
        (Ok(a), Ok(b)) => assert_eq!(a, b),
        (Err(BeanError::Ambiguous { .. }), Err(BeanError::Ambiguous { .. })) => {}
        (Err(BeanError::Unsatisfied { .. }), Err(BeanError::Unsatisfied { .. })) => {}
        (Err(_), Err(_)) => {}
        (a, b) => panic!("resolution changed between calls: {:?} vs {:?}", a.is_ok(), b.is_ok()),
    }
});
