use anyhow::Context;
use anyhow::bail;
use sb_http::RequestDescriptor;

pub const DEFAULT_CONFIG_PATH: &str = "sb.toml";

pub const USAGE: &str = "usage: sb_fetch [--config FILE] [--region REGION] [--regional] [--label TEXT] [--force] <METHOD_KEY> <PATH>...";

/// Arguments of the `sb_fetch` binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchArgs {
    pub config_path: String,
    pub region: Option<String>,
    pub regional: bool,
    pub label: Option<String>,
    pub force: bool,
    pub method_key: String,
    /// One call per path, all submitted at once
    pub paths: Vec<String>,
}

impl FetchArgs {
    /// Parse arguments, program name excluded
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config_path = DEFAULT_CONFIG_PATH.to_string();
        let mut region = None;
        let mut regional = false;
        let mut label = None;
        let mut force = false;
        let mut positional = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => config_path = args.next().context("--config needs a value")?,
                "--region" => region = Some(args.next().context("--region needs a value")?.to_lowercase()),
                "--label" => label = Some(args.next().context("--label needs a value")?),
                "--regional" => regional = true,
                "--force" => force = true,
                flag if flag.starts_with("--") => bail!("unknown flag {}\n{}", flag, USAGE),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let Some(method_key) = positional.next() else { bail!("missing METHOD_KEY\n{}", USAGE) };
        let paths: Vec<String> = positional.collect();
        if paths.is_empty() {
            bail!("missing PATH\n{}", USAGE);
        }
        if let Some(path) = paths.iter().find(|path| !path.starts_with('/')) {
            bail!("path {:?} must start with '/'", path);
        }

        Ok(Self { config_path, region, regional, label, force, method_key, paths })
    }

    /// One descriptor per requested path
    pub fn descriptors(&self) -> Vec<RequestDescriptor> {
        self.paths
            .iter()
            .map(|path| {
                let descriptor = if self.regional {
                    RequestDescriptor::regional(&self.method_key, path)
                } else {
                    RequestDescriptor::platform(&self.method_key, path)
                };
                let descriptor = match &self.region {
                    Some(region) => descriptor.region(region),
                    None => descriptor,
                };
                descriptor.label(self.label.clone().unwrap_or_else(|| path.clone())).force(self.force)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<FetchArgs> {
        FetchArgs::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn test_positional_only() {
        let args = parse(&["summoner-v4.by-puuid", "/lol/summoner/v4/summoners/by-puuid/abc"]).unwrap();

        assert_eq!(args.config_path, DEFAULT_CONFIG_PATH);
        assert_eq!(args.method_key, "summoner-v4.by-puuid");
        assert_eq!(args.paths, vec!["/lol/summoner/v4/summoners/by-puuid/abc"]);
        assert!(!args.regional);
    }

    #[test]
    fn test_flags() {
        let args = parse(&["--region", "EUW", "--regional", "--force", "--config", "prod.toml", "match-v5.by-id", "/a", "/b"]).unwrap();

        assert_eq!(args.region.as_deref(), Some("euw"));
        assert_eq!(args.config_path, "prod.toml");
        assert!(args.regional && args.force);

        let descriptors = args.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert!(descriptors.iter().all(|descriptor| descriptor.is_regional && descriptor.force));
        assert_eq!(descriptors[1].region.as_deref(), Some("euw"));
        assert_eq!(descriptors[1].debug_label, "/b");
    }

    #[test]
    fn test_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["summoner-v4.by-puuid"]).is_err());
        assert!(parse(&["summoner-v4.by-puuid", "no-slash"]).is_err());
        assert!(parse(&["--verbose", "summoner-v4.by-puuid", "/a"]).is_err());
        assert!(parse(&["summoner-v4.by-puuid", "/a", "--region"]).is_err());
    }
}
