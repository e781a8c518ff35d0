use scaledown_core::ScaleDownConfig;

pub fn print_default() -> anyhow::Result<()> {
    print!("{}", ScaleDownConfig::default_toml()?);
    Ok(())
}
