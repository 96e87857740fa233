#[cfg(all(not(test), not(feature = "debug-checks")))]
pub const QUOKKA_ASSERT_LEVEL_DEFINITION: u8 = QUOKKA_ASSERT_SIMPLE;

#[cfg(any(test, feature = "debug-checks"))]
pub const QUOKKA_ASSERT_LEVEL_DEFINITION: u8 = QUOKKA_ASSERT_EXTREME;

pub const QUOKKA_ASSERT_SIMPLE: u8 = 1;
pub const QUOKKA_ASSERT_MODERATE: u8 = 2;
pub const QUOKKA_ASSERT_ADVANCED: u8 = 3;
pub const QUOKKA_ASSERT_EXTREME: u8 = 4;

#[macro_export]
#[doc(hidden)]
macro_rules! quokka_assert_simple {
    ($($arg:tt)*) => {
        if $crate::asserts::QUOKKA_ASSERT_LEVEL_DEFINITION >= $crate::asserts::QUOKKA_ASSERT_SIMPLE {
            assert!($($arg)*);
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! quokka_assert_eq_simple {
    ($($arg:tt)*) => {
        if $crate::asserts::QUOKKA_ASSERT_LEVEL_DEFINITION >= $crate::asserts::QUOKKA_ASSERT_SIMPLE {
            assert_eq!($($arg)*);
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! quokka_assert_moderate {
    ($($arg:tt)*) => {
        if $crate::asserts::QUOKKA_ASSERT_LEVEL_DEFINITION >= $crate::asserts::QUOKKA_ASSERT_MODERATE {
            assert!($($arg)*);
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! quokka_assert_advanced {
    ($($arg:tt)*) => {
        if $crate::asserts::QUOKKA_ASSERT_LEVEL_DEFINITION >= $crate::asserts::QUOKKA_ASSERT_ADVANCED {
            assert!($($arg)*);
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! quokka_assert_extreme {
    ($($arg:tt)*) => {
        if $crate::asserts::QUOKKA_ASSERT_LEVEL_DEFINITION >= $crate::asserts::QUOKKA_ASSERT_EXTREME {
            assert!($($arg)*);
        }
    };
}
