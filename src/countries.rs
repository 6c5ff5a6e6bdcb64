use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub enum Continent {
    Africa,
    Asia,
    Europe,
    NorthAmerica,
    SouthAmerica,
    Oceania,
    Antarctica,
}

impl Continent {
    pub fn code(self) -> &'static str {
        match self {
            Continent::Africa => "AF",
            Continent::Asia => "AS",
            Continent::Europe => "EU",
            Continent::NorthAmerica => "NA",
            Continent::SouthAmerica => "SA",
            Continent::Oceania => "OC",
            Continent::Antarctica => "AN",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Continent::Africa => "Africa",
            Continent::Asia => "Asia",
            Continent::Europe => "Europe",
            Continent::NorthAmerica => "North America",
            Continent::SouthAmerica => "South America",
            Continent::Oceania => "Oceania",
            Continent::Antarctica => "Antarctica",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "AF" => Some(Continent::Africa),
            "AS" => Some(Continent::Asia),
            "EU" => Some(Continent::Europe),
            "NA" => Some(Continent::NorthAmerica),
            "SA" => Some(Continent::SouthAmerica),
            "OC" => Some(Continent::Oceania),
            "AN" => Some(Continent::Antarctica),
            _ => None,
        }
    }
}

/// Continent for an ISO 3166-1 alpha-2 code. TMDb still emits a handful of
/// historical codes (SU, YU, CS, DD, XC, XG) which are mapped too.
pub fn continent_of(country: &str) -> Option<Continent> {
    let code = country.trim().to_ascii_uppercase();
    let continent = match code.as_str() {
        "DZ" | "AO" | "BJ" | "BW" | "BF" | "BI" | "CV" | "CM" | "CF" | "TD" | "KM" | "CG"
        | "CD" | "CI" | "DJ" | "EG" | "GQ" | "ER" | "SZ" | "ET" | "GA" | "GM" | "GH" | "GN"
        | "GW" | "KE" | "LS" | "LR" | "LY" | "MG" | "MW" | "ML" | "MR" | "MU" | "YT" | "MA"
        | "MZ" | "NA" | "NE" | "NG" | "RE" | "RW" | "SH" | "ST" | "SN" | "SC" | "SL" | "SO"
        | "ZA" | "SS" | "SD" | "TZ" | "TG" | "TN" | "UG" | "EH" | "ZM" | "ZW" => {
            Continent::Africa
        },
        "AF" | "AM" | "AZ" | "BH" | "BD" | "BT" | "BN" | "KH" | "CN" | "CY" | "GE" | "HK"
        | "IN" | "ID" | "IR" | "IQ" | "IL" | "JP" | "JO" | "KZ" | "KP" | "KR" | "KW" | "KG"
        | "LA" | "LB" | "MO" | "MY" | "MV" | "MN" | "MM" | "NP" | "OM" | "PK" | "PS" | "PH"
        | "QA" | "SA" | "SG" | "LK" | "SY" | "TW" | "TJ" | "TH" | "TL" | "TR" | "TM" | "AE"
        | "UZ" | "VN" | "YE" => Continent::Asia,
        "AL" | "AD" | "AT" | "BY" | "BE" | "BA" | "BG" | "HR" | "CZ" | "DK" | "EE" | "FO"
        | "FI" | "FR" | "DE" | "GI" | "GR" | "GG" | "HU" | "IS" | "IE" | "IM" | "IT" | "JE"
        | "XK" | "LV" | "LI" | "LT" | "LU" | "MT" | "MD" | "MC" | "ME" | "NL" | "MK" | "NO"
        | "PL" | "PT" | "RO" | "RU" | "SM" | "RS" | "SK" | "SI" | "ES" | "SJ" | "SE" | "CH"
        | "UA" | "GB" | "VA" | "AX" | "SU" | "YU" | "CS" | "DD" | "XC" | "XG" => {
            Continent::Europe
        },
        "AI" | "AG" | "AW" | "BS" | "BB" | "BZ" | "BM" | "BQ" | "VG" | "CA" | "KY" | "CR"
        | "CU" | "CW" | "DM" | "DO" | "SV" | "GL" | "GD" | "GP" | "GT" | "HT" | "HN" | "JM"
        | "MQ" | "MX" | "MS" | "NI" | "PA" | "PR" | "BL" | "KN" | "LC" | "MF" | "PM" | "VC"
        | "SX" | "TT" | "TC" | "US" | "VI" | "AN" => Continent::NorthAmerica,
        "AR" | "BO" | "BR" | "CL" | "CO" | "EC" | "FK" | "GF" | "GY" | "PY" | "PE" | "SR"
        | "UY" | "VE" => Continent::SouthAmerica,
        "AS" | "AU" | "CK" | "FJ" | "PF" | "GU" | "KI" | "MH" | "FM" | "NR" | "NC" | "NZ"
        | "NU" | "NF" | "MP" | "PW" | "PG" | "PN" | "WS" | "SB" | "TK" | "TO" | "TV" | "UM"
        | "VU" | "WF" => Continent::Oceania,
        "AQ" | "BV" | "GS" | "HM" | "TF" => Continent::Antarctica,
        _ => return None,
    };
    Some(continent)
}
