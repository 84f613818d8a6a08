//! IBAN-style Mod97 check digits for human-typed short pseudonyms
//!
//! Short pseudonyms are transcribed by hand; the trailing two check digits
//! catch the common transcription slips (single wrong character, adjacent
//! transposition).

/// Errors from check-digit computation.
#[derive(Debug, thiserror::Error)]
pub enum Mod97Error {
    /// Characters outside `[A-Za-z0-9 -]`.
    #[error("input contains invalid characters")]
    InvalidCharacters,
    /// Too few characters to compute check digits over.
    #[error("input too short")]
    TooShort,
}

/// Compute the two check digits for `input`. Dashes and spaces are ignored;
/// remaining characters must be alphanumeric (letters map to 10..35,
/// case-insensitive).
pub fn compute_check_digits(input: &str) -> Result<String, Mod97Error> {
    let working: String = input.chars().filter(|c| *c != '-' && *c != ' ').collect();
    if !working.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Mod97Error::InvalidCharacters);
    }

    let mut numberstring = String::with_capacity(working.len() * 2);
    for c in working.chars() {
        let c = c.to_ascii_uppercase();
        if c.is_ascii_digit() {
            numberstring.push(c);
        } else {
            numberstring.push_str(&((c as u32) - 55).to_string());
        }
    }
    // Two trailing zeros stand in for the check digits being computed.
    numberstring.push_str("00");
    // The chunked reduction needs at least one full-width chunk.
    if numberstring.len() < 9 {
        return Err(Mod97Error::TooShort);
    }

    // Stepwise mod 97: a first chunk of nine digits, then chunks of seven
    // prepended with the running remainder.
    let digits = numberstring.as_bytes();
    let mut segstart = 0usize;
    let mut step = 9usize;
    let mut prepended = String::new();
    while segstart + step < digits.len() {
        let chunk = &numberstring[segstart..segstart + step];
        let number: u64 = format!("{prepended}{chunk}")
            .parse()
            .map_err(|_| Mod97Error::TooShort)?;
        prepended = format!("{:02}", number % 97);
        segstart += step;
        step = 7;
    }

    let tail: u64 = format!("{}{}", prepended, &numberstring[segstart..])
        .parse()
        .map_err(|_| Mod97Error::TooShort)?;
    Ok(format!("{:02}", 98 - (tail % 97)))
}

/// Verify a string whose last two characters are its check digits.
pub fn verify(input: &str) -> bool {
    const CHECK_DIGIT_COUNT: usize = 2;
    if input.len() < CHECK_DIGIT_COUNT {
        return false;
    }
    let (to_check, provided) = input.split_at(input.len() - CHECK_DIGIT_COUNT);
    match compute_check_digits(to_check) {
        Ok(computed) => computed == provided,
        Err(_) => false,
    }
}
