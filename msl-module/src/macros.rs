// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

/// Declares a render-state enumeration. Every generated type has an extra `Unset = -1` variant
/// that is the default, and carries the snake_case name used for it in shader sources.
macro_rules! state_enum {
    {
        $(#[doc = $ty_doc:literal])*
        $ty:ident;

        $(
            $(#[doc = $flag_doc:literal])*
            $flag_name:ident = $value:literal, $text:literal,
        )+
    } => {
        $(#[doc = $ty_doc])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(i32)]
        pub enum $ty {
            /// The value hasn't been set, and the runtime default applies.
            #[default]
            Unset = -1,
            $(
                $(#[doc = $flag_doc])*
                $flag_name = $value,
            )+
        }

        impl $ty {
            /// Every value except `Unset`, in encoding order.
            pub const ALL: &'static [$ty] = &[$($ty::$flag_name),+];

            /// Returns the encoded value.
            #[inline]
            pub const fn as_raw(self) -> i32 {
                self as i32
            }

            /// Decodes a value, returning `None` if it is out of range.
            #[inline]
            pub const fn from_raw(value: i32) -> Option<Self> {
                match value {
                    -1 => Some(Self::Unset),
                    $($value => Some(Self::$flag_name),)+
                    _ => None,
                }
            }

            /// Returns the name used for the value in shader sources.
            #[inline]
            pub const fn name(self) -> Option<&'static str> {
                match self {
                    Self::Unset => None,
                    $(Self::$flag_name => Some($text),)+
                }
            }

            /// Looks a value up by the name used for it in shader sources.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($text => Some(Self::$flag_name),)+
                    _ => None,
                }
            }

            #[inline]
            pub const fn is_set(self) -> bool {
                !matches!(self, Self::Unset)
            }
        }
    };
}

/// Declares a closed enumeration that is encoded as a `u32` in declaration order.
macro_rules! index_enum {
    {
        $(#[doc = $ty_doc:literal])*
        $ty:ident;

        $(
            $(#[doc = $flag_doc:literal])*
            $flag_name:ident = $value:literal,
        )+
    } => {
        $(#[doc = $ty_doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u32)]
        pub enum $ty {
            $(
                $(#[doc = $flag_doc])*
                $flag_name = $value,
            )+
        }

        impl $ty {
            /// Every value, in encoding order.
            pub const ALL: &'static [$ty] = &[$($ty::$flag_name),+];

            /// Returns the encoded value.
            #[inline]
            pub const fn as_raw(self) -> u32 {
                self as u32
            }

            /// Decodes a value, returning `None` if it is out of range.
            #[inline]
            pub const fn from_raw(value: u32) -> Option<Self> {
                match value {
                    $($value => Some(Self::$flag_name),)+
                    _ => None,
                }
            }
        }
    };
}

pub(crate) use {index_enum, state_enum};
