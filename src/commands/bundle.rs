use anyhow::Result;

use super::{bundle_options, create_bundle, Context};
use crate::bundler::DEFAULT_BUNDLE_NAME;
use crate::cli::BundleArgs;

pub async fn run(ctx: &Context, args: BundleArgs) -> Result<i32> {
    let config = ctx.load_config(args.config.to_settings())?;
    let output = args
        .output
        .unwrap_or_else(|| ctx.work_dir.join(DEFAULT_BUNDLE_NAME));

    let mut options = bundle_options(&config, args.fuzz_tests, args.revision, output);
    options.build_args = args.build_args;

    let path = create_bundle(options).await?;
    println!("{}", path.display());
    Ok(0)
}
