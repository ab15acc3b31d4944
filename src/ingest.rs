use std::io::Read;

use anyhow::{bail, Context, Result};

use crate::atlas::polling::PollingPlace;

// Offline ingestion of the AEC polling place CSV. The data is static and out
// of our control, so the parse is strict: an unexpected header or a row with
// an unparseable numeric field fails the whole run after reporting every
// offending line.

const EXPECTED_HEADER: [&str; 29] = [
    "StateCo",
    "StateAb",
    "DivName",
    "DivId",
    "DivCo",
    "PPName",
    "Status",
    "PremisesName",
    "Address1",
    "Address2",
    "Address3",
    "Locality",
    "AddrStateAb",
    "Postcode",
    "PPId",
    "AdvPremisesName",
    "AdvAddress",
    "AdvLocality",
    "AdvBoothLocation",
    "AdvGateAccess",
    "EntrancesDesc",
    "Lat",
    "Long",
    "CCD",
    "WheelchairAccess",
    "OrdVoteEst",
    "DecVoteEst",
    "NoOrdIssuingOff",
    "NoOfDecIssuingOff",
];

// Column positions, named as in the header row.
const STATE_CO: usize = 0;
const STATE_AB: usize = 1;
const DIV_NAME: usize = 2;
const DIV_ID: usize = 3;
const DIV_CO: usize = 4;
const PP_NAME: usize = 5;
const STATUS: usize = 6;
const PREMISES_NAME: usize = 7;
const ADDRESS_1: usize = 8;
const ADDRESS_2: usize = 9;
const ADDRESS_3: usize = 10;
const LOCALITY: usize = 11;
const ADDR_STATE_AB: usize = 12;
const POSTCODE: usize = 13;
const PP_ID: usize = 14;
const ADV_PREMISES_NAME: usize = 15;
const ADV_ADDRESS: usize = 16;
const ADV_LOCALITY: usize = 17;
const ADV_BOOTH_LOCATION: usize = 18;
const ADV_GATE_ACCESS: usize = 19;
const ENTRANCES_DESC: usize = 20;
const LAT: usize = 21;
const LONG: usize = 22;
const CCD: usize = 23;
const WHEELCHAIR_ACCESS: usize = 24;
const ORD_VOTE_EST: usize = 25;
const DEC_VOTE_EST: usize = 26;
const NO_ORD_ISSUING_OFF: usize = 27;
const NO_OF_DEC_ISSUING_OFF: usize = 28;

/// Parse the CSV export. Abolished polling places and places without
/// coordinates are skipped silently; anything else malformed is an error.
pub(crate) fn parse_polling_places<R: Read>(input: R) -> Result<Vec<PollingPlace>> {
    let mut reader = csv::Reader::from_reader(input);
    check_header(reader.headers().context("Failed to read CSV header")?)?;

    let mut places = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    for (row, record) in reader.records().enumerate() {
        // Header is line 1; the first data row is line 2.
        let line = row + 2;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                errors.push(format!("Line {line}: {err}"));
                continue;
            }
        };
        match parse_row(&record, line) {
            Ok(Some(place)) => places.push(place),
            Ok(None) => {}
            Err(row_errors) => errors.extend(row_errors),
        }
    }

    if !errors.is_empty() {
        bail!("Errors found:\n  {}", errors.join("\n  "));
    }
    Ok(places)
}

fn check_header(header: &csv::StringRecord) -> Result<()> {
    if header.len() != EXPECTED_HEADER.len() {
        bail!("Invalid header length: Expected {}, got {}", EXPECTED_HEADER.len(), header.len());
    }
    for (i, expected) in EXPECTED_HEADER.iter().enumerate() {
        let got = header.get(i).unwrap_or_default();
        if got != *expected {
            bail!("Invalid header {i}: Expected {expected}, got {got}");
        }
    }
    Ok(())
}

fn parse_int(record: &csv::StringRecord, idx: usize, line: usize, errors: &mut Vec<String>) -> i32 {
    let raw = record.get(idx).unwrap_or_default();
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            errors.push(format!("Line {line}: Invalid {} '{raw}'", EXPECTED_HEADER[idx]));
            0
        }
    }
}

fn parse_float(record: &csv::StringRecord, idx: usize, line: usize, errors: &mut Vec<String>) -> f64 {
    let raw = record.get(idx).unwrap_or_default();
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            errors.push(format!("Line {line}: Invalid {} '{raw}'", EXPECTED_HEADER[idx]));
            0.0
        }
    }
}

/// Parse one row; `None` for rows skipped by policy.
fn parse_row(record: &csv::StringRecord, line: usize) -> Result<Option<PollingPlace>, Vec<String>> {
    let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();
    let mut errors: Vec<String> = Vec::new();

    // Field parse order mirrors the column layout: errors recorded before a
    // skip rule fires still fail the run.
    let state_code = parse_int(record, STATE_CO, line, &mut errors);
    let division_id = parse_int(record, DIV_ID, line, &mut errors);
    let division_code = parse_int(record, DIV_CO, line, &mut errors);

    let status = field(STATUS);
    if status == "Abolition" {
        return if errors.is_empty() { Ok(None) } else { Err(errors) };
    }

    let postcode = parse_int(record, POSTCODE, line, &mut errors);
    let place_id = parse_int(record, PP_ID, line, &mut errors);

    if record.get(LAT).unwrap_or_default().is_empty()
        || record.get(LONG).unwrap_or_default().is_empty()
    {
        return if errors.is_empty() { Ok(None) } else { Err(errors) };
    }

    let lat = parse_float(record, LAT, line, &mut errors);
    let lng = parse_float(record, LONG, line, &mut errors);

    let ccd = parse_int(record, CCD, line, &mut errors);
    let ordinary_vote_est = parse_int(record, ORD_VOTE_EST, line, &mut errors);
    let declaration_vote_est = parse_int(record, DEC_VOTE_EST, line, &mut errors);
    let num_ordinary_officers = parse_int(record, NO_ORD_ISSUING_OFF, line, &mut errors);
    let num_declaration_officers = parse_int(record, NO_OF_DEC_ISSUING_OFF, line, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Some(PollingPlace {
        state_code,
        state_abbr: field(STATE_AB),
        division_name: field(DIV_NAME),
        division_id,
        division_code,
        pretty_name: field(PP_NAME),
        place_id,
        status,
        premises: field(PREMISES_NAME),
        address1: field(ADDRESS_1),
        address2: field(ADDRESS_2),
        address3: field(ADDRESS_3),
        suburb: field(LOCALITY),
        addr_state: field(ADDR_STATE_AB),
        postcode,
        adv_premises: field(ADV_PREMISES_NAME),
        adv_address: field(ADV_ADDRESS),
        adv_locality: field(ADV_LOCALITY),
        booth_location: field(ADV_BOOTH_LOCATION),
        gate_access: field(ADV_GATE_ACCESS),
        entrances: field(ENTRANCES_DESC),
        lat,
        lng,
        ccd,
        wheelchair_access: field(WHEELCHAIR_ACCESS),
        ordinary_vote_est,
        declaration_vote_est,
        num_ordinary_officers,
        num_declaration_officers,
    }))
}
