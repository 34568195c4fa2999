// Build script to compile GLSL shaders to SPIR-V
//
// Output lands under assets/, where the desktop host's asset directory
// serves it by name (shaders/shader.vert.spv, shaders/shader.frag.spv).

use std::path::Path;
use std::process::Command;

const SHADERS: [(&str, &str); 2] = [
    ("shaders/shader.vert", "assets/shaders/shader.vert.spv"),
    ("shaders/shader.frag", "assets/shaders/shader.frag.spv"),
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    if let Err(e) = std::fs::create_dir_all("assets/shaders") {
        println!("cargo:warning=Could not create assets/shaders: {}", e);
        return;
    }

    for (input, output) in SHADERS {
        compile_shader(input, output);
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    // glslc ships with the Vulkan SDK
    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} not compiled", e, input);
            println!("cargo:warning=Install the Vulkan SDK or run: glslc {} -o {}", input, output);
        }
    }
}
