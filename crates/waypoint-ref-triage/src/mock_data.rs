//! Simulated triage data for the Waypoint reference agent.
//!
//! All data in this module is hardcoded and fictional. No external systems are
//! contacted. The symptom rules and clinic directory stand in for the real
//! HTTP and MCP services named in `agents/triage.toml`.

use serde_json::{json, Value};

// ── Callers (mock) ────────────────────────────────────────────────────────────

/// A fictional caller used by the scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub session_id: &'static str,
    pub name: &'static str,
    pub postcode: &'static str,
}

pub const ROUTINE_CALLER: Caller = Caller {
    session_id: "call-0417",
    name: "Ingrid Solberg",
    postcode: "0150",
};

pub const RED_FLAG_CALLER: Caller = Caller {
    session_id: "call-0422",
    name: "Tomas Berg",
    postcode: "5003",
};

pub const STUCK_CALLER: Caller = Caller {
    session_id: "call-0431",
    name: "Mira Haugen",
    postcode: "7010",
};

// ── Symptom rules (mock) ──────────────────────────────────────────────────────

/// Phrases that send the caller straight to a nurse.
const RED_FLAGS: [&str; 6] = [
    "chest pain",
    "chest hurts",
    "numb",
    "short of breath",
    "slurred",
    "unconscious",
];

/// Phrases that need same-day care.
const URGENT_SIGNS: [&str; 4] = ["high fever", "stiff neck", "vomiting", "severe"];

/// Classify a free-text symptom description.
///
/// Matching is case-insensitive substring search:
/// - any red flag        → `emergency`
/// - any urgent sign     → `urgent`
/// - otherwise           → `routine`
///
/// The advice strings never contain a severity word, so `tool_result`
/// triggers keyed on the band cannot match the advice by accident.
pub fn assess_symptoms(text: &str) -> Value {
    let lowered = text.to_lowercase();
    let red_flags: Vec<&str> = RED_FLAGS.iter().copied().filter(|f| lowered.contains(f)).collect();
    let urgent: Vec<&str> = URGENT_SIGNS.iter().copied().filter(|s| lowered.contains(s)).collect();

    let (severity, advice) = if !red_flags.is_empty() {
        ("emergency", "Call 113 now and stay on the line.")
    } else if !urgent.is_empty() {
        ("urgent", "A nurse should assess the caller today.")
    } else {
        ("routine", "Book a walk-in clinic slot; rest and drink fluids meanwhile.")
    };

    json!({
        "severity": severity,
        "red_flags": red_flags,
        "urgent_signs": urgent,
        "advice": advice
    })
}

// ── Clinic directory (mock) ───────────────────────────────────────────────────

/// Look up the nearest walk-in clinic for a four-digit postcode.
///
/// Known postcodes: 0150 (Oslo), 5003 (Bergen), 7010 (Trondheim). Any other
/// postcode returns `None`.
pub fn find_clinic(postcode: &str) -> Option<Value> {
    let (clinic, address, next_slot) = match postcode {
        "0150" => ("Sentrum Legevakt", "Storgata 40, Oslo", "18:40"),
        "5003" => ("Bergen Walk-in", "Vestre Strømkaien 19, Bergen", "19:15"),
        "7010" => ("Midtbyen Helse", "Olav Tryggvasons gate 8, Trondheim", "20:05"),
        _ => return None,
    };

    Some(json!({
        "postcode": postcode,
        "clinic": clinic,
        "address": address,
        "next_slot": next_slot
    }))
}
