use anyhow::Result;

pub fn prompt_password_hidden(prompt: &str) -> Result<String> {
    let pw = rpassword::prompt_password(prompt)?;
    Ok(pw)
}
