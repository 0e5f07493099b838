//! Line format: `ADC: <integer>, Voltage: <decimal>`.

use crate::ParseError;

const ADC_LABEL: &str = "ADC:";
const VOLTAGE_LABEL: &str = "Voltage:";

/// Both fields of a well-formed line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedLine {
    pub adc: i32,
    pub voltage: f64,
    /// Digits after the decimal point in the voltage text, when it is plain
    /// decimal notation.
    pub scale: Option<u8>,
}

/// Parse one line.
///
/// Labels are stripped wherever they appear in their field and surrounding
/// whitespace is ignored, so `"2050,2.05"` parses too. Fields past the
/// second are ignored.
pub fn parse_line(raw: &str) -> Result<ParsedLine, ParseError> {
    let line = raw.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 2 {
        return Err(ParseError::MissingField(parts.len()));
    }

    let adc_raw = parts[0].replace(ADC_LABEL, "");
    let adc_raw = adc_raw.trim();
    let voltage_raw = parts[1].replace(VOLTAGE_LABEL, "");
    let voltage_raw = voltage_raw.trim();

    let adc = adc_raw
        .parse::<i32>()
        .map_err(|_| ParseError::InvalidAdc(adc_raw.to_string()))?;
    let voltage = voltage_raw
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidVoltage(voltage_raw.to_string()))?;

    Ok(ParsedLine {
        adc,
        voltage,
        scale: decimal_scale(voltage_raw),
    })
}

fn decimal_scale(text: &str) -> Option<u8> {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return None;
    }
    u8::try_from(fraction.len()).ok()
}
