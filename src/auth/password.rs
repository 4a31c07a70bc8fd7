//! Password-based authentication responses

/// Build the response to an MD5 password challenge.
///
/// The digest is `md5(md5(password ⧺ user) ⧺ salt)`, sent as the literal
/// ASCII string `md5` followed by 32 lowercase hex digits.
pub fn md5_response(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = md5::compute(format!("{}{}", password, user).as_bytes());

    let mut outer_input = format!("{:x}", inner).into_bytes();
    outer_input.extend_from_slice(salt);

    format!("md5{:x}", md5::compute(&outer_input))
}
