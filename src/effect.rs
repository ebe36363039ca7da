//! Drop effect selection
//!
//! Maps the modifier keys held during a drag and the effects offered by the drag
//! source to the single effect reported back to OLE. Bit values match the Win32
//! `DROPEFFECT_*` and `MK_*` constants so the Windows backend can pass them through.

use std::fmt;
use std::ops::BitOr;

/// Set of `DROPEFFECT_*` bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DropEffects(u32);

impl DropEffects {
    pub const NONE: Self = Self(0);
    pub const COPY: Self = Self(0x1);
    pub const MOVE: Self = Self(0x2);
    pub const LINK: Self = Self(0x4);
    pub const ALL: Self = Self(0x1 | 0x2 | 0x4);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of a non-empty `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// No copy, move or link bit set (scroll and other flags are ignored).
    pub const fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }
}

impl BitOr for DropEffects {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for DropEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::NONE => "none",
            Self::COPY => "copy",
            Self::MOVE => "move",
            Self::LINK => "link",
            _ => return write!(f, "{:#x}", self.0),
        };
        f.write_str(name)
    }
}

/// `MK_*` key-state bits delivered with every drag callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModifierKeys(u32);

impl ModifierKeys {
    pub const NONE: Self = Self(0);
    pub const SHIFT: Self = Self(0x4);
    pub const CONTROL: Self = Self(0x8);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ModifierKeys {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// First of copy, link, move (in that order) offered by `allowed`.
fn preferred(allowed: DropEffects) -> DropEffects {
    [DropEffects::COPY, DropEffects::LINK, DropEffects::MOVE]
        .into_iter()
        .find(|effect| allowed.contains(*effect))
        .unwrap_or(DropEffects::NONE)
}

/// Pick the effect for the current key state.
///
/// Ctrl+Shift asks for link, Ctrl for copy, Shift for move. Without modifiers, or
/// when the requested effect is not offered, the first offered effect in
/// copy/link/move order wins. An empty mask yields `NONE`.
pub fn resolve(keys: ModifierKeys, allowed: DropEffects) -> DropEffects {
    let control = keys.contains(ModifierKeys::CONTROL);
    let shift = keys.contains(ModifierKeys::SHIFT);

    let wanted = match (control, shift) {
        (true, true) => DropEffects::LINK,
        (true, false) => DropEffects::COPY,
        (false, true) => DropEffects::MOVE,
        (false, false) => preferred(allowed),
    };

    if allowed.contains(wanted) {
        wanted
    } else {
        preferred(allowed)
    }
}

/// Resolve against the mask an OLE caller handed in. Some sources report an empty
/// mask; those are treated as offering every effect.
pub fn resolve_reported(keys: ModifierKeys, reported: DropEffects) -> DropEffects {
    let allowed = if reported.is_empty() { DropEffects::ALL } else { reported };
    resolve(keys, allowed)
}
