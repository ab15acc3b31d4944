use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One polling place record from the AEC export. Serialized field names match
/// the original wire casing; the whole record is embedded into point feature
/// properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PollingPlace {
    #[serde(rename = "StateCode")]
    pub(crate) state_code: i32,
    #[serde(rename = "StateAbbreviation")]
    pub(crate) state_abbr: String,
    #[serde(rename = "DivisionName")]
    pub(crate) division_name: String,
    #[serde(rename = "DivisionId")]
    pub(crate) division_id: i32,
    #[serde(rename = "DivisionCode")]
    pub(crate) division_code: i32,
    #[serde(rename = "PrettyPrintName")]
    pub(crate) pretty_name: String,
    #[serde(rename = "PollingPlaceId")]
    pub(crate) place_id: i32,
    #[serde(rename = "Status")]
    pub(crate) status: String,
    #[serde(rename = "PremisesName")]
    pub(crate) premises: String,
    #[serde(rename = "Address1")]
    pub(crate) address1: String,
    #[serde(rename = "Address2")]
    pub(crate) address2: String,
    #[serde(rename = "Address3")]
    pub(crate) address3: String,
    #[serde(rename = "AddressSuburb")]
    pub(crate) suburb: String,
    #[serde(rename = "AddressStateAbbreviation")]
    pub(crate) addr_state: String,
    #[serde(rename = "Postcode")]
    pub(crate) postcode: i32,
    #[serde(rename = "AdvPremisesName")]
    pub(crate) adv_premises: String,
    #[serde(rename = "AdvAddress")]
    pub(crate) adv_address: String,
    #[serde(rename = "AdvLocality")]
    pub(crate) adv_locality: String,
    #[serde(rename = "AdviceBoothLocation")]
    pub(crate) booth_location: String,
    #[serde(rename = "AdviceGateAccess")]
    pub(crate) gate_access: String,
    #[serde(rename = "EntrancesDescription")]
    pub(crate) entrances: String,
    #[serde(rename = "Lat")]
    pub(crate) lat: f64,
    #[serde(rename = "Lng")]
    pub(crate) lng: f64,
    #[serde(rename = "CensusCollectionDistrict")]
    pub(crate) ccd: i32,
    #[serde(rename = "WheelchairAccess")]
    pub(crate) wheelchair_access: String,
    #[serde(rename = "OrdinaryVoteEstimate")]
    pub(crate) ordinary_vote_est: i32,
    #[serde(rename = "DeclarationVoteEstimate")]
    pub(crate) declaration_vote_est: i32,
    #[serde(rename = "NumberOrdinaryIssuingOfficers")]
    pub(crate) num_ordinary_officers: i32,
    #[serde(rename = "NumberDeclarationIssuingOfficers")]
    pub(crate) num_declaration_officers: i32,
}

/// Read the polling place JSON written by `import-polling-places`.
pub(crate) fn load_polling_places(path: &Path) -> Result<Vec<PollingPlace>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open polling places file {}", path.display()))?;
    let places: Vec<PollingPlace> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse polling places file {}", path.display()))?;
    Ok(places)
}

/// A visible marker standing in for nearby polling places at some zoom.
/// Members reference the flat polling place list by index only.
#[derive(Debug, Clone)]
pub(crate) struct ClusterGroup {
    /// Ascending polling place indices.
    pub(crate) members: Vec<usize>,
    pub(crate) lng: f64,
    pub(crate) lat: f64,
    /// Zoom the group first appears at; `NO_ZOOM` for viewport-index groups.
    pub(crate) min_zoom: u32,
    /// Owning division id, or empty when members span several divisions.
    pub(crate) division: String,
}

impl ClusterGroup {
    /// Build a group around the mean of its members' coordinates, truncated
    /// (not rounded) to five decimal places.
    pub(crate) fn new(
        mut members: Vec<usize>,
        min_zoom: u32,
        division: String,
        places: &[PollingPlace],
    ) -> Self {
        members.sort_unstable();
        let count = members.len() as f64;
        let (sum_lng, sum_lat) = members
            .iter()
            .fold((0.0, 0.0), |(lng, lat), &i| (lng + places[i].lng, lat + places[i].lat));
        Self {
            lng: truncate(sum_lng / count),
            lat: truncate(sum_lat / count),
            members,
            min_zoom,
            division,
        }
    }

    /// Stable identifier independent of zoom: comma-joined ascending member
    /// polling place IDs.
    pub(crate) fn id_no_zoom(&self, places: &[PollingPlace]) -> String {
        let mut ids: Vec<i32> = self.members.iter().map(|&i| places[i].place_id).collect();
        ids.sort_unstable();
        ids.iter().map(i32::to_string).collect::<Vec<_>>().join(",")
    }

    /// Full identifier: `{min_zoom}_{id_no_zoom}`.
    pub(crate) fn id(&self, places: &[PollingPlace]) -> String {
        format!("{}_{}", self.min_zoom, self.id_no_zoom(places))
    }
}

/// Truncate to five decimal places. Not the sharpest way to cut a float to a
/// fixed number of decimals, but good enough for marker coordinates.
fn truncate(value: f64) -> f64 {
    (value * 1e5).trunc() / 1e5
}

#[cfg(test)]
pub(crate) fn test_place(division: &str, place_id: i32, lng: f64, lat: f64) -> PollingPlace {
    PollingPlace {
        state_code: 1,
        state_abbr: "NSW".into(),
        division_name: division.into(),
        division_id: 100,
        division_code: 100,
        pretty_name: format!("{division} {place_id}"),
        place_id,
        status: "Current".into(),
        premises: String::new(),
        address1: String::new(),
        address2: String::new(),
        address3: String::new(),
        suburb: String::new(),
        addr_state: "NSW".into(),
        postcode: 2000,
        adv_premises: String::new(),
        adv_address: String::new(),
        adv_locality: String::new(),
        booth_location: String::new(),
        gate_access: String::new(),
        entrances: String::new(),
        lat,
        lng,
        ccd: 0,
        wheelchair_access: String::new(),
        ordinary_vote_est: 0,
        declaration_vote_est: 0,
        num_ordinary_officers: 0,
        num_declaration_officers: 0,
    }
}
