use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use itertools::Itertools;
use regex::Regex;

use crate::statement::html::html_to_text;
use crate::statement::transaction::{self, BANK_PARTNER, CLOSING_KIND, Transaction};
use crate::statement::{Amount, Statement};

static RE_BALANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<b>(Neuer|Alter)\s+Saldo</b><br/>[^<]*<b>(\S+)\s+Euro</b>")
        .expect("Failed to create regex pattern for balance")
});

static RE_SEPARATOR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<hr/>\s*").expect("Failed to create regex pattern for separator lines"));

static RE_IMAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<img[^>]+><br/>\s*").expect("Failed to create regex pattern for image lines"));

static RE_CLOSING_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<b>Abschlussbetrag[\s\S]+").expect("Failed to create regex pattern for closing summary")
});

static RE_FOOTER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^.+?_T<br/>\s*").expect("Failed to create regex pattern for footer lines"));

static RE_PAGE_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a name=\d+></a>").expect("Failed to create regex pattern for page anchor"));

static RE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d\d\.\d\d\.\d{4}").expect("Failed to create regex pattern for date"));

static RE_LEADING_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d\d\.\d\d\.\d{4}").expect("Failed to create regex pattern for leading date"));

static RE_VALUTA_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d\d.\d\d.\d{4}.").expect("Failed to create regex pattern for valuta line"));

static RE_EXACT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d\d)\.(\d\d)\.(\d{4})$").expect("Failed to create regex pattern for exact date"));

static RE_LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br/>").expect("Failed to create regex pattern for line break"));

static RE_KIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<b>([^<]+)</b>").expect("Failed to create regex pattern for kind"));

static RE_PARTNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</b>([^<]+)<br/>").expect("Failed to create regex pattern for partner"));

static RE_TEXT_BEFORE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([^<]+)<br/>").expect("Failed to create regex pattern for text"));

static RE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br/>\n?Referenz:&#160;([^<\s]+)<br/>$").expect("Failed to create regex pattern for reference")
});

static RE_MANDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br/>\n?Mandat:&#160;([^<\s]+)<br/>").expect("Failed to create regex pattern for mandate")
});

/// Application text lines with these prefixes hold the reference and mandate.
const METADATA_PREFIXES: [&str; 2] = ["Mandat:", "Referenz:"];

/// Parse a statement document produced by `pdftohtml`.
///
/// # Errors
/// Returns an error if the balances are missing or an entry is malformed.
pub fn parse_statement(content: &str) -> Result<Statement> {
    let (old_balance, new_balance) = extract_balances(content)?;
    let cleaned = remove_junk(content);

    let mut transactions = Vec::new();
    for (page_index, page) in RE_PAGE_ANCHOR.split(&cleaned).enumerate() {
        for chunk in find_entry_chunks(page) {
            let transaction =
                parse_entry(&chunk).with_context(|| format!("Failed to parse entry on page {page_index}:\n{chunk}"))?;
            transactions.push(transaction);
        }
    }

    Ok(Statement {
        old_balance,
        new_balance,
        transactions,
    })
}

/// Old and new account balance from the statement header.
fn extract_balances(content: &str) -> Result<(Amount, Amount)> {
    let mut old_balance = None;
    let mut new_balance = None;
    for caps in RE_BALANCE.captures_iter(content) {
        let amount = Amount::from_german(&caps[2]);
        match &caps[1] {
            "Alter" => {
                old_balance.get_or_insert(amount);
            }
            _ => {
                new_balance.get_or_insert(amount);
            }
        }
    }

    Ok((
        old_balance.context("Statement has no old balance (Alter Saldo)")?,
        new_balance.context("Statement has no new balance (Neuer Saldo)")?,
    ))
}

/// Strip page separators, images, footers and the closing summary.
fn remove_junk(content: &str) -> String {
    let content = RE_SEPARATOR_LINE.replace_all(content, "");
    let content = RE_IMAGE_LINE.replace_all(&content, "");
    let content = RE_CLOSING_SUMMARY.replace_all(&content, "");
    RE_FOOTER_LINE.replace_all(&content, "").into_owned()
}

/// Find the text chunks of all table entries on a page.
///
/// An entry spans four lines and an optional fifth:
/// booking date, `<b>kind</b>partner`, amount, valuta date, application text.
fn find_entry_chunks(page: &str) -> Vec<String> {
    let lines: Vec<&str> = page.split('\n').collect();
    let mut chunks = Vec::new();
    let mut index = 0;
    while index < lines.len() {
        if let Some((chunk, line_count)) = entry_at(&lines, index) {
            chunks.push(chunk);
            index += line_count;
        } else {
            index += 1;
        }
    }
    chunks
}

/// Entry chunk starting at the given line and the number of lines it covers.
fn entry_at(lines: &[&str], index: usize) -> Option<(String, usize)> {
    let first = lines[index];
    let start = RE_DATE.find(first)?.start();
    let kind_line = lines.get(index + 1)?;
    let amount_line = lines.get(index + 2)?;
    let valuta_line = lines.get(index + 3)?;

    if kind_line.len() <= "<b>".len() || !kind_line.starts_with("<b>") {
        return None;
    }
    if amount_line.is_empty() || !RE_VALUTA_LINE.is_match(valuta_line) {
        return None;
    }

    let mut line_count = 4;
    if let Some(application_line) = lines.get(index + 4)
        && !application_line.is_empty()
        && !RE_LEADING_DATE.is_match(application_line)
    {
        line_count = 5;
    }

    let chunk = std::iter::once(&first[start..])
        .chain(lines[index + 1..index + line_count].iter().copied())
        .join("\n");

    Some((chunk, line_count))
}

/// Parse a single entry chunk.
fn parse_entry(chunk: &str) -> Result<Transaction> {
    let lines: Vec<&str> = chunk.split('\n').collect();

    let kind = extract_kind(chunk)?;
    let initiation = extract_initiation(chunk)?;
    let valuta = extract_valuta(&lines)?;
    let partner = extract_partner(chunk, &kind)?;
    let amount = Amount::from_german(lines.get(2).context("Entry has no amount line")?);
    let application = extract_application(&lines, &kind);
    let reference = capture_text(&RE_REFERENCE, chunk);
    let mandate = capture_text(&RE_MANDATE, chunk);

    Ok(Transaction {
        initiation,
        valuta,
        partner,
        kind,
        application,
        amount,
        old_balance: None,
        new_balance: None,
        reference,
        mandate,
    })
}

fn extract_kind(chunk: &str) -> Result<String> {
    let caps = RE_KIND
        .captures(chunk)
        .context("Entry is expected to have a kind enclosed in <b>")?;
    Ok(transaction::display_kind(html_to_text(&caps[1]).trim()))
}

fn extract_initiation(chunk: &str) -> Result<NaiveDate> {
    let line_break = RE_LINE_BREAK
        .find(chunk)
        .context("Entry is expected to start with the booking date")?;
    parse_date(&chunk[..line_break.start()])
}

fn extract_valuta(lines: &[&str]) -> Result<NaiveDate> {
    let line = lines.get(3).context("Entry is expected to have at least four lines")?;
    let caps = RE_TEXT_BEFORE_BREAK
        .captures(line)
        .context("Entry is expected to have the valuta date on the fourth line")?;
    parse_date(&caps[1])
}

fn extract_partner(chunk: &str, kind: &str) -> Result<String> {
    if transaction::is_internal_kind(kind) {
        return Ok(BANK_PARTNER.to_string());
    }
    let caps = RE_PARTNER
        .captures(chunk)
        .context("Entry is expected to have the transaction partner right after the kind")?;
    Ok(html_to_text(&caps[1]).trim().to_string())
}

/// Purpose text from the fifth line without the reference and mandate parts.
fn extract_application(lines: &[&str], kind: &str) -> Option<String> {
    if kind == CLOSING_KIND {
        return None;
    }
    let line = lines.get(4)?;
    let text = RE_LINE_BREAK.replace_all(line, "\n");
    let application = text
        .trim()
        .split('\n')
        .filter(|part| !METADATA_PREFIXES.iter().any(|prefix| part.starts_with(prefix)))
        .map(html_to_text)
        .join(" ");

    (!application.is_empty()).then_some(application)
}

fn capture_text(pattern: &Regex, chunk: &str) -> Option<String> {
    pattern
        .captures(chunk)
        .map(|caps| html_to_text(&caps[1]).trim().to_string())
}

/// Parse a `dd.mm.yyyy` date.
fn parse_date(text: &str) -> Result<NaiveDate> {
    let caps = RE_EXACT_DATE
        .captures(text)
        .ok_or_else(|| anyhow!("Expected a date in format dd.mm.yyyy: '{text}'"))?;
    let day: u32 = caps[1].parse()?;
    let month: u32 = caps[2].parse()?;
    let year: i32 = caps[3].parse()?;
    NaiveDate::from_ymd_opt(year, month, day).with_context(|| format!("Invalid date: '{text}'"))
}
