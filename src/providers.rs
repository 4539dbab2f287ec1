//! Demonstration algorithms shipped with the command-line tool.
//!
//! The library registers nothing itself; these two providers show how an
//! external crate plugs algorithms in.

use processed_raster::{
    AlgorithmDescriptor, AlgorithmRegistry, ArgKind, ArgumentSpec, Builtin, DataType, InitOutput,
    RegistryError,
};

/// Register every demonstration algorithm in the global registry.
pub fn register_all() -> Result<(), RegistryError> {
    let registry = AlgorithmRegistry::global();
    registry.register(scale())?;
    registry.register(band_mean())?;
    Ok(())
}

/// `scale`: multiply every sample by `factor`, keeping no-data untouched.
fn scale() -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("scale")
        .builtin(Builtin::NoData)
        .argument(ArgumentSpec::optional("factor", ArgKind::Double))
        .requested_input_type(DataType::Float64)
        .init(|ctx| {
            Ok(InitOutput::new(ctx.input_band_count, DataType::Float64)
                .with_nodata(ctx.input_nodata.to_vec()))
        })
        .process(|ctx| {
            let factor = ctx.arguments.get_double("factor").unwrap_or(1.0);
            let nodata = ctx.arguments.get_double("nodata");
            for p in 0..ctx.pixel_count() {
                for b in 0..ctx.input_band_count {
                    let v = ctx.input_value(p, b);
                    let is_nodata = match nodata {
                        Some(nd) => v == nd || (v.is_nan() && nd.is_nan()),
                        None => false,
                    };
                    ctx.set_output_value(p, b, if is_nodata { v } else { v * factor });
                }
            }
            Ok(())
        })
        .build()
}

/// `band_mean`: average all input bands into one Float64 band.
fn band_mean() -> AlgorithmDescriptor {
    AlgorithmDescriptor::builder("band_mean")
        .requested_input_type(DataType::Float64)
        .init(|_| Ok(InitOutput::new(1, DataType::Float64)))
        .process(|ctx| {
            let bands = ctx.input_band_count as f64;
            for p in 0..ctx.pixel_count() {
                let sum: f64 = (0..ctx.input_band_count)
                    .map(|b| ctx.input_value(p, b))
                    .sum();
                ctx.set_output_value(p, 0, sum / bands);
            }
            Ok(())
        })
        .build()
}
