use anyhow::Result;

use super::Context;
use crate::cli::ExecuteArgs;
use crate::executor::Executor;

pub async fn run(ctx: &Context, args: ExecuteArgs) -> Result<i32> {
    let executor = Executor::load(&ctx.work_dir)?;

    if args.fuzz_test.is_none() && !args.single_fuzz_test {
        print_fuzzers(&executor);
        return Ok(0);
    }

    let code = executor.run(args.fuzz_test.as_deref()).await?;
    if code != 0 {
        tracing::debug!(code, "Fuzzer exited with non-zero status");
    }
    Ok(code)
}

fn print_fuzzers(executor: &Executor) {
    let metadata = executor.metadata();
    let base = if metadata.run_environment.docker.is_empty() {
        &metadata.docker_base_image
    } else {
        &metadata.run_environment.docker
    };
    println!("This bundle is based on: {base}");
    println!();
    println!("Available fuzz tests:");
    for fuzzer in executor.fuzzers() {
        println!("  {}", fuzzer.name);
        println!("    using: {}", fuzzer.engine);
        println!("    run fuzz test with: fuzzkit execute {}", fuzzer.name);
        println!();
    }
}
