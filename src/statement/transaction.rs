use std::fmt;

use chrono::NaiveDate;

use crate::statement::Amount;

/// Partner name used for bookings the bank makes on its own account.
pub const BANK_PARTNER: &str = "ING-DiBa";

/// Booking kinds as printed on the statement and their display names.
/// Kinds missing from this table are used as printed.
static KINDS: [(&str, &str); 11] = [
    ("Lastschrift", "Lastschrift"),
    ("Gehalt/Rente", "Gehalt/Rente"),
    ("Ueberweisung", "Überweisung"),
    ("Dauerauftrag/Terminueberw.", "Dauerauftrag / Terminueberweisung"),
    ("Gutschrift", "Gutschrift"),
    ("Abschluss", "Abschluss"),
    ("Abbuchung", "Abbuchung"),
    ("Gutschrift/Dauerauftrag", "Gutschrift / Dauerauftrag"),
    ("Retoure", "Retoure"),
    ("Wertpapierkauf", "Wertpapierkauf"),
    ("Zins/Dividende WP", "Zins/Dividende WP"),
];

/// Kinds booked by the bank itself, which have no separate transaction partner.
static INTERNAL_KINDS: [&str; 3] = ["Wertpapierkauf", "Abschluss", "Zins/Dividende WP"];

/// Kind for account closing entries, which carry no application text.
pub const CLOSING_KIND: &str = "Abschluss";

/// Map a booking kind from the statement to its display name.
#[must_use]
pub fn display_kind(kind: &str) -> String {
    KINDS
        .iter()
        .find(|(printed, _)| *printed == kind)
        .map_or_else(|| kind.to_string(), |(_, display)| (*display).to_string())
}

/// True for bookings the bank makes on its own account.
#[must_use]
pub fn is_internal_kind(kind: &str) -> bool {
    INTERNAL_KINDS.contains(&kind)
}

/// One booking on a giro account statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub initiation: NaiveDate,
    pub valuta: NaiveDate,
    pub partner: String,
    pub kind: String,
    /// Purpose text (Verwendungszweck).
    pub application: Option<String>,
    pub amount: Amount,
    /// Account balance before this booking.
    pub old_balance: Option<Amount>,
    /// Account balance after this booking.
    pub new_balance: Option<Amount>,
    pub reference: Option<String>,
    pub mandate: Option<String>,
}

impl Transaction {
    /// Field values in CSV column order.
    #[must_use]
    pub fn to_record(&self) -> [String; 10] {
        [
            self.initiation.format("%Y-%m-%d").to_string(),
            self.valuta.format("%Y-%m-%d").to_string(),
            self.partner.clone(),
            self.kind.clone(),
            self.application.clone().unwrap_or_default(),
            self.old_balance.map(|b| b.to_string()).unwrap_or_default(),
            self.new_balance.map(|b| b.to_string()).unwrap_or_default(),
            self.amount.to_string(),
            self.reference.clone().unwrap_or_default(),
            self.mandate.clone().unwrap_or_default(),
        ]
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}   {:>10}€   {:<34} {}",
            self.initiation.format("%d.%m.%Y"),
            self.amount.to_string(),
            self.kind,
            self.partner
        )
    }
}
