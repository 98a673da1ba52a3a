//! Distance and boundary normalization: repetition quantifiers,
//! empty-token runs, and COSMAS proximity operators.

use koralq_core::status;
use koralq_core::{Boundary, Distance, DistanceKey, Reports};

/// Largest distance value the engine accepts; greater values crop.
pub const MAXIMUM_DISTANCE: u32 = 100;

/// Collapse a maximal run of empty-token boundaries into one by
/// element-wise summation. Unbounded members make the result unbounded.
pub fn collapse_run(run: &[Boundary]) -> Boundary {
    run.iter().copied().fold(Boundary::fixed(0), Boundary::sum)
}

/// A parsed COSMAS proximity operator (`/+w1:4,s0` etc.).
#[derive(Debug, Clone, PartialEq)]
pub struct Proximity {
    /// Some direction prefix was given.
    pub in_order: bool,
    /// `-` prefix: the right operand precedes the left one.
    pub inverted: bool,
    pub exclude: bool,
    pub distances: Vec<Distance>,
    /// Trailing `min`/`max` grouping option was present.
    pub grouping: bool,
}

/// Parse the option string of a proximity operator, i.e. the text after
/// the leading `/` or `%`. Syntax errors are reported with the COSMAS
/// diagnostic codes and yield `None`.
pub fn parse_proximity(spec: &str, exclude: bool, reports: &mut Reports) -> Option<Proximity> {
    let mut direction: Option<char> = None;
    let mut direction_count = 0usize;
    let mut distances = Vec::new();
    let mut grouping = false;

    for clause in spec.split(',') {
        let clause = clause.trim();
        if clause.is_empty() {
            report_prox(reports, status::ERR_PROX_UNKNOWN, spec);
            return None;
        }
        if clause.eq_ignore_ascii_case("min") || clause.eq_ignore_ascii_case("max") {
            grouping = true;
            continue;
        }

        let mut rest = clause;
        while let Some(stripped) = rest.strip_prefix(['+', '-']) {
            direction = rest.chars().next();
            direction_count += 1;
            if direction_count > 1 {
                report_prox(reports, status::ERR_PROX_DIR_TOOGREAT, spec);
                return None;
            }
            rest = stripped;
        }

        let measures: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        rest = &rest[measures.len()..];
        let key = match measures.len() {
            0 => {
                report_prox(reports, status::ERR_PROX_MEAS_NULL, spec);
                return None;
            }
            1 => match DistanceKey::from_letter(measures.chars().next().unwrap_or('w')) {
                Some(key) => key,
                None => {
                    report_prox(reports, status::ERR_PROX_WRONG_CHARS, spec);
                    return None;
                }
            },
            _ => {
                report_prox(reports, status::ERR_PROX_MEAS_TOOGREAT, spec);
                return None;
            }
        };

        let boundary = match parse_values(rest) {
            Ok(Some((min, max))) => Boundary::new(
                crop(min, reports),
                Some(crop(max, reports)),
            ),
            Ok(None) => {
                report_prox(reports, status::ERR_PROX_VAL_NULL, spec);
                return None;
            }
            Err(ValueError::TooMany) => {
                report_prox(reports, status::ERR_PROX_VAL_TOOGREAT, spec);
                return None;
            }
            Err(ValueError::WrongChars) => {
                report_prox(reports, status::ERR_PROX_WRONG_CHARS, spec);
                return None;
            }
        };

        let mut distance = Distance::cosmas(key, boundary);
        distance.exclude = exclude;
        distances.push(distance);
    }

    if distances.is_empty() {
        report_prox(reports, status::ERR_PROX_MEAS_NULL, spec);
        return None;
    }

    Some(Proximity {
        in_order: direction.is_some(),
        inverted: direction == Some('-'),
        exclude,
        distances,
        grouping,
    })
}

enum ValueError {
    TooMany,
    WrongChars,
}

/// `"3"` means up to three units (`0:3`); `"3:5"` is an explicit pair,
/// normalized so that min <= max.
fn parse_values(rest: &str) -> Result<Option<(u32, u32)>, ValueError> {
    if rest.is_empty() {
        return Ok(None);
    }
    let parts: Vec<&str> = rest.split(':').collect();
    if parts.len() > 2 {
        return Err(ValueError::TooMany);
    }
    let mut values = Vec::with_capacity(2);
    for part in &parts {
        match part.parse::<u32>() {
            Ok(v) => values.push(v),
            Err(_) => return Err(ValueError::WrongChars),
        }
    }
    match values[..] {
        [single] => Ok(Some((0, single))),
        [a, b] => Ok(Some((a.min(b), a.max(b)))),
        _ => Ok(None),
    }
}

fn crop(value: u32, reports: &mut Reports) -> u32 {
    if value > MAXIMUM_DISTANCE {
        reports.warning(format!(
            "You specified a distance between two segments that is greater than \
             the allowed max value of {MAXIMUM_DISTANCE}. Your query will be \
             re-interpreted using a distance of {MAXIMUM_DISTANCE}."
        ));
        return MAXIMUM_DISTANCE;
    }
    value
}

fn report_prox(reports: &mut Reports, code: u32, text: &str) {
    let message = match code {
        status::ERR_PROX_MEAS_NULL => format!(
            "Proximity operator at '{text}': one of the following prox. types is missing: w,s,p!"
        ),
        status::ERR_PROX_MEAS_TOOGREAT => format!(
            "Proximity operator at '{text}': Please, specify only 1 of the following prox. \
             types: w,s,p! It is possible to specify several at once by separating them \
             with a ','. E.g.: ' /+w2,s2,p0 '."
        ),
        status::ERR_PROX_VAL_NULL => format!(
            "Proximity operator at '{text}': please specify a numerical value for the \
             distance. E.g. ' /+w5 '."
        ),
        status::ERR_PROX_VAL_TOOGREAT => format!(
            "Proximity operator at '{text}': please specify only 1 distance value. \
             E.g. ' /+w5 '."
        ),
        status::ERR_PROX_DIR_TOOGREAT => format!(
            "Proximity operator at '{text}': please specify either '+' or '-' or none \
             of them for the direction."
        ),
        status::ERR_PROX_WRONG_CHARS => {
            format!("Proximity operator at '{text}': unknown proximity options!")
        }
        _ => format!(
            "Proximity operator at '{text}': unknown error. The correct syntax looks \
             like this: E.g. ' /+w2 ' or ' /w10,s0 '."
        ),
    };
    reports.error(code, message);
}
