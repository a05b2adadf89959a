#![no_main]

use ferrous_beans::{BaseType, ClassHierarchy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(ty) = BaseType::parse(text) else {
        return;
    };

    // Printing and parsing again yields the same type
    let printed = ty.to_string();
    let again = BaseType::parse(&printed).expect("printed types parse");
    assert_eq!(again, ty);

    let hierarchy = ClassHierarchy::new();
    let _ = ty.is_assignable_from(&ty, &hierarchy);
});
