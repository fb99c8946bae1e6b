//! Events produced by the purchase state monitor.

use std::fmt;

/// The on-screen conditions the monitor tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A six-digit listing price is shown
    SixDigitPrice,
    /// The listing reports that nothing is for sale
    NoItemsAvailable,
    /// A seven-digit price (thousands separator in the seventh position) is shown
    SevenDigitSeparator,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::SixDigitPrice,
        EventKind::NoItemsAvailable,
        EventKind::SevenDigitSeparator,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            EventKind::SixDigitPrice => 0,
            EventKind::NoItemsAvailable => 1,
            EventKind::SevenDigitSeparator => 2,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::SixDigitPrice => write!(f, "six_digits"),
            EventKind::NoItemsAvailable => write!(f, "no_items"),
            EventKind::SevenDigitSeparator => write!(f, "seven_sep"),
        }
    }
}

/// A detected condition. Only `SixDigitPrice` carries a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurchaseEvent {
    pub kind: EventKind,
    pub price: Option<u32>,
}

impl PurchaseEvent {
    pub fn price(price: u32) -> Self {
        Self {
            kind: EventKind::SixDigitPrice,
            price: Some(price),
        }
    }

    pub fn no_items() -> Self {
        Self {
            kind: EventKind::NoItemsAvailable,
            price: None,
        }
    }

    pub fn separator() -> Self {
        Self {
            kind: EventKind::SevenDigitSeparator,
            price: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_are_distinct() {
        let mut seen = [false; 3];
        for kind in EventKind::ALL {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
    }

    #[test]
    fn test_constructors() {
        assert_eq!(PurchaseEvent::price(450_000).price, Some(450_000));
        assert_eq!(PurchaseEvent::no_items().kind, EventKind::NoItemsAvailable);
        assert_eq!(PurchaseEvent::separator().price, None);
        assert_eq!(format!("{}", EventKind::SixDigitPrice), "six_digits");
    }
}
