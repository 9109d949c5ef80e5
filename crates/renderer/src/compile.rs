use std::borrow::Cow;

use anyhow::{anyhow, Result};
use wgpu::naga::ShaderStage;

pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile(device, "material vertex", VERTEX_SHADER_GLSL, ShaderStage::Vertex)
}

pub(crate) fn compile_material_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile(device, "warp material fragment", MATERIAL_SHADER_GLSL, ShaderStage::Fragment)
}

fn compile(
    device: &wgpu::Device,
    label: &'static str,
    source: &'static str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(anyhow!("failed to compile {label}: {err}")),
        None => Ok(module),
    }
}

const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + 0.5;
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

// Block layout must stay in sync with `gpu::uniforms::MaterialUniforms`.
pub(crate) const MATERIAL_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform MaterialParams {
    vec4 frame;
    vec4 warp;
    vec4 surface;
    vec4 liquid;
    vec4 camera;
    vec4 light;
    ivec4 flags;
    vec4 colors[5];
} params;

#define uResolution params.frame.xy
#define uTime params.frame.z
#define uOpacity params.frame.w
#define uDisplacement params.warp.xy
#define uDeformAmplitude params.warp.z
#define uNoiseScale params.warp.w
#define uCartoonLevels params.surface.x
#define uBrightness params.surface.y
#define uRoughness params.surface.z
#define uReflectivity params.surface.w
#define uIntensity params.liquid.x
#define uLevel params.liquid.y
#define uSeed params.liquid.z
#define uYBias params.liquid.w
#define uNumColors params.flags.x

const mat2 warpMatrix = mat2(1.2, 0.0, -0.3, 0.8);

float rand(vec3 p) {
    return fract(sin(dot(p, vec3(12.9898, 78.233, 45.5432))) * 43758.5453);
}

float noise(vec2 p, float s) {
    vec2 ip = floor(p);
    vec2 u = fract(p);
    u = u * u * (3.0 - 2.0 * u);
    float a = rand(vec3(ip, s));
    float b = rand(vec3(ip + vec2(1.0, 0.0), s));
    float c = rand(vec3(ip + vec2(0.0, 1.0), s));
    float d = rand(vec3(ip + vec2(1.0, 1.0), s));
    float m = mix(mix(a, b, u.x), mix(c, d, u.x), u.y);
    return m * m;
}

float fbm(vec2 p, float s) {
    p *= uNoiseScale;
    float f = 0.0;
    f += 0.5 * noise(p + uTime * 0.1, s);
    p = warpMatrix * p * 2.02;
    f += 0.25 * noise(p, s);
    p = warpMatrix * p * 2.01;
    f += 0.125 * noise(p, s);
    p = warpMatrix * p * 2.03;
    f += 0.0625 * noise(p + sin(uTime) * 0.5, s);
    return f / 0.9375;
}

float pattern(vec2 p, float s) {
    return fbm(p + fbm(p + fbm(p + fbm(p + fbm(p, s), s), s), s), s);
}

vec3 colormapColor(float x) {
    if (uNumColors < 2) {
        return params.colors[0].rgb * params.colors[0].w;
    }
    float stepSize = 1.0 / float(uNumColors - 1);
    int idx = int(floor(x / stepSize));
    float t = (x - float(idx) * stepSize) / stepSize;
    idx = clamp(idx, 0, uNumColors - 2);
    vec3 c = mix(params.colors[idx].rgb, params.colors[idx + 1].rgb, t);
    float i = mix(params.colors[idx].w, params.colors[idx + 1].w, t);
    return c * i;
}

vec3 environment(vec3 dir, vec3 lightDir) {
    float h = clamp(dir.y * 0.5 + 0.5, 0.0, 1.0);
    vec3 sky = mix(vec3(0.04, 0.04, 0.07), vec3(0.55, 0.62, 0.72), h);
    float sun = pow(max(dot(dir, lightDir), 0.0), 48.0);
    return sky + vec3(sun);
}

void main() {
    vec3 eye = vec3(0.0, 0.0, -2.0);
    if (params.camera.w > 0.5) {
        eye = params.camera.xyz;
    }
    vec3 forward = normalize(eye);
    vec3 right = cross(vec3(0.0, 1.0, 0.0), forward);
    if (dot(right, right) < 1e-6) {
        right = vec3(1.0, 0.0, 0.0);
    }
    right = normalize(right);
    vec3 up = cross(forward, right);

    vec2 p = v_uv * 2.0 - 1.0;
    vec3 N = forward;
    vec3 worldPos = p.x * right + p.y * up;
    if (params.flags.w != 0) {
        float r2 = dot(p, p);
        if (r2 > 1.0) {
            discard;
        }
        N = normalize(p.x * right + p.y * up + sqrt(1.0 - r2) * forward);
        worldPos = N;
    }

    vec2 frag = v_uv * uResolution;
    vec2 uv = frag / uResolution.x;
    float dx = pattern(uv, uSeed);
    float dy = pattern(uv + vec2(1.7, 2.3), uSeed);
    vec2 duv = uv + vec2(dx * uDisplacement.x, dy * uDisplacement.y) * uDeformAmplitude;

    vec4 baseCol = vec4(0.0);
    if (uNumColors > 0) {
        float sh = pattern(duv, uSeed) * uIntensity;
        sh = floor(sh * uCartoonLevels) / uCartoonLevels;
        vec3 rgb = colormapColor(sh);
        float yF = v_uv.y * 2.0 * uYBias;
        float a = smoothstep(0.4, 0.6, sh + uLevel + yF);
        baseCol = mix(vec4(0.0), vec4(rgb, 1.0), a);
    }

    vec3 L = normalize(params.light.xyz);
    float lam = 1.0;
    float spec = 0.0;
    if (params.flags.y != 0) {
        lam = max(dot(N, L), 0.0) * params.light.w;
        float shininess = mix(8.0, 64.0, 1.0 - uRoughness);
        spec = pow(lam, shininess) * params.light.w;
    }

    vec3 env = vec3(0.0);
    if (params.flags.z != 0) {
        vec3 V = normalize(eye - worldPos);
        env = environment(reflect(-V, N), L);
    }

    vec3 lit = baseCol.rgb * lam + spec * (1.0 - uRoughness);
    vec3 color = mix(lit, env, uReflectivity);
    color = mix(color, vec3(1.0), uBrightness);
    outColor = vec4(color, uOpacity);
}
";
