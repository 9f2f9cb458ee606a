//! `phonenumber.info`

use phonenumber::country::Id;
use phonenumber::{Mode, PhoneNumber};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::Context;

const MIN_NATIONAL_DIGITS: usize = 4;
const MAX_E164_DIGITS: usize = 15;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhoneArgs {
    pub number: String,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneInfo {
    pub country_code: u16,
    pub e164: String,
    pub is_possible: bool,
    pub is_valid: bool,
    pub national_number: u64,
}

#[derive(Debug, Error)]
pub enum PhoneError {
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    #[error("could not parse {number:?}: {source}")]
    Parse {
        number: String,
        #[source]
        source: phonenumber::ParseError,
    },
}

fn region_id(region: &str) -> Result<Id, PhoneError> {
    region
        .trim()
        .to_ascii_uppercase()
        .parse::<Id>()
        .map_err(|_| PhoneError::UnknownRegion(region.to_string()))
}

/// Length check only: a number is possible when its digit count fits E.164
fn is_possible(number: &PhoneNumber, valid: bool) -> bool {
    if valid {
        return true;
    }
    let national = number.national().to_string().len();
    let country = number.country().code().to_string().len();
    national >= MIN_NATIONAL_DIGITS && national + country <= MAX_E164_DIGITS
}

/// Parse `number`, reading it in the `region` numbering plan unless it
/// carries its own `+CC` prefix
pub fn info(_ctx: &mut Context, args: PhoneArgs) -> Result<PhoneInfo, PhoneError> {
    let region = args.region.as_deref().map(region_id).transpose()?;
    let number = phonenumber::parse(region, &args.number).map_err(|source| PhoneError::Parse {
        number: args.number.clone(),
        source,
    })?;

    let is_valid = phonenumber::is_valid(&number);
    Ok(PhoneInfo {
        country_code: number.country().code(),
        e164: number.format().mode(Mode::E164).to_string(),
        is_possible: is_possible(&number, is_valid),
        is_valid,
        national_number: number.national().value(),
    })
}
