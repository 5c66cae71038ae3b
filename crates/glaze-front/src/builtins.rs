//! Seeds the read-only built-in symbol-table level: stage variables
//! and a representative built-in function library.

use glaze_hir::{
    BasicType, Op, Precision, Sampler, SamplerDim, SamplerScalar, Storage, Type,
};

use crate::context::ParseContext;
use crate::options::{Profile, Stage};
use crate::symbol::{Param, Symbol, SymbolKind};

fn variable(ctx: &mut ParseContext, name: &str, ty: Type) {
    ctx.table.insert(Symbol::variable(name, ty));
}

fn function(ctx: &mut ParseContext, name: &str, return_ty: Type, params: &[Type], op: Option<Op>) {
    let params = params
        .iter()
        .map(|ty| Param {
            name: None,
            ty: ty.clone(),
        })
        .collect();
    let mut symbol = Symbol::function(name, return_ty, params);
    if let SymbolKind::Function { builtin_op, .. } = &mut symbol.kind {
        *builtin_op = op;
    }
    ctx.table.insert(symbol);
}

fn gen_float(size: u32) -> Type {
    if size == 1 {
        Type::scalar(BasicType::Float, Storage::In)
    } else {
        Type::vector(BasicType::Float, Storage::In, size)
    }
}

fn gen_int(size: u32) -> Type {
    if size == 1 {
        Type::scalar(BasicType::Int, Storage::In)
    } else {
        Type::vector(BasicType::Int, Storage::In, size)
    }
}

fn ret_float(size: u32) -> Type {
    if size == 1 {
        Type::scalar(BasicType::Float, Storage::Temporary)
    } else {
        Type::vector(BasicType::Float, Storage::Temporary, size)
    }
}

fn sampler_param(scalar: SamplerScalar, dim: SamplerDim, shadow: bool) -> Type {
    let mut sampler = Sampler::new(scalar, dim);
    sampler.shadow = shadow;
    let mut ty = Type::sampler(sampler);
    ty.qualifier.storage = Storage::In;
    ty
}

/// Populates the built-in level. Must run before
/// `SymbolTable::seal_builtins`.
pub fn seed(ctx: &mut ParseContext) {
    seed_variables(ctx);
    seed_functions(ctx);
}

fn seed_variables(ctx: &mut ParseContext) {
    let es = ctx.profile == Profile::Es;
    let version = ctx.version;

    match ctx.stage {
        Stage::Vertex => {
            let mut position = Type::vector(BasicType::Float, Storage::Position, 4);
            position.qualifier.precision = Precision::High;
            variable(ctx, "gl_Position", position);

            let mut point_size = Type::scalar(BasicType::Float, Storage::PointSize);
            point_size.qualifier.precision = Precision::High;
            variable(ctx, "gl_PointSize", point_size);

            if (es && version >= 300) || (!es && version >= 130) {
                variable(
                    ctx,
                    "gl_VertexID",
                    Type::scalar(BasicType::Int, Storage::VertexId),
                );
                variable(
                    ctx,
                    "gl_InstanceID",
                    Type::scalar(BasicType::Int, Storage::InstanceId),
                );
            }
        }
        Stage::Fragment => {
            let mut frag_coord = Type::vector(BasicType::Float, Storage::FragCoord, 4);
            frag_coord.qualifier.precision = Precision::High;
            variable(ctx, "gl_FragCoord", frag_coord);

            variable(
                ctx,
                "gl_FrontFacing",
                Type::scalar(BasicType::Bool, Storage::Face),
            );

            if es || version >= 120 {
                let mut point_coord = Type::vector(BasicType::Float, Storage::PointCoord, 2);
                point_coord.qualifier.precision = Precision::Medium;
                variable(ctx, "gl_PointCoord", point_coord);
            }

            // gone from 300 es and the 420 core profile
            let removed = (es && version >= 300)
                || (ctx.profile == Profile::Core && version >= 420);
            if !removed {
                let mut frag_color = Type::vector(BasicType::Float, Storage::FragColor, 4);
                frag_color.qualifier.precision = Precision::Medium;
                variable(ctx, "gl_FragColor", frag_color);
            }

            if !es || version >= 300 {
                let mut frag_depth = Type::scalar(BasicType::Float, Storage::FragDepth);
                frag_depth.qualifier.precision = Precision::High;
                variable(ctx, "gl_FragDepth", frag_depth);
            }
        }
        _ => {}
    }
}

fn seed_functions(ctx: &mut ParseContext) {
    let es = ctx.profile == Profile::Es;
    let version = ctx.version;

    // component-wise math over the float genTypes
    for size in 1..=4 {
        let gen = gen_float(size);
        let ret = ret_float(size);
        let unary_ops = [
            ("sin", Op::Sin),
            ("cos", Op::Cos),
            ("sqrt", Op::Sqrt),
            ("inversesqrt", Op::InverseSqrt),
            ("abs", Op::Abs),
            ("sign", Op::Sign),
            ("floor", Op::Floor),
            ("fract", Op::Fract),
            ("exp", Op::Exp),
            ("log", Op::Log),
            ("exp2", Op::Exp2),
            ("log2", Op::Log2),
            ("normalize", Op::Normalize),
        ];
        for (name, op) in unary_ops {
            function(ctx, name, ret.clone(), &[gen.clone()], Some(op));
        }

        function(ctx, "pow", ret.clone(), &[gen.clone(), gen.clone()], Some(Op::Pow));
        function(ctx, "min", ret.clone(), &[gen.clone(), gen.clone()], Some(Op::Min));
        function(ctx, "max", ret.clone(), &[gen.clone(), gen.clone()], Some(Op::Max));
        function(
            ctx,
            "clamp",
            ret.clone(),
            &[gen.clone(), gen.clone(), gen.clone()],
            Some(Op::Clamp),
        );
        function(
            ctx,
            "mix",
            ret.clone(),
            &[gen.clone(), gen.clone(), gen.clone()],
            Some(Op::Mix),
        );
        function(ctx, "step", ret.clone(), &[gen.clone(), gen.clone()], Some(Op::Step));
        function(
            ctx,
            "smoothstep",
            ret.clone(),
            &[gen.clone(), gen.clone(), gen.clone()],
            Some(Op::SmoothStep),
        );
        function(ctx, "reflect", ret.clone(), &[gen.clone(), gen.clone()], Some(Op::Reflect));

        let float_ret = ret_float(1);
        function(ctx, "length", float_ret.clone(), &[gen.clone()], Some(Op::Length));
        function(
            ctx,
            "distance",
            float_ret.clone(),
            &[gen.clone(), gen.clone()],
            Some(Op::Distance),
        );

        if size > 1 {
            let scalar = gen_float(1);
            function(
                ctx,
                "min",
                ret.clone(),
                &[gen.clone(), scalar.clone()],
                Some(Op::Min),
            );
            function(
                ctx,
                "max",
                ret.clone(),
                &[gen.clone(), scalar.clone()],
                Some(Op::Max),
            );
            function(
                ctx,
                "clamp",
                ret.clone(),
                &[gen.clone(), scalar.clone(), scalar.clone()],
                Some(Op::Clamp),
            );
            function(ctx, "dot", float_ret, &[gen.clone(), gen.clone()], Some(Op::Dot));
        }

        // integer variants of the shared component-wise set
        let igen = gen_int(size);
        let iret = if size == 1 {
            Type::scalar(BasicType::Int, Storage::Temporary)
        } else {
            Type::vector(BasicType::Int, Storage::Temporary, size)
        };
        function(ctx, "abs", iret.clone(), &[igen.clone()], Some(Op::Abs));
        function(ctx, "min", iret.clone(), &[igen.clone(), igen.clone()], Some(Op::Min));
        function(ctx, "max", iret.clone(), &[igen.clone(), igen.clone()], Some(Op::Max));
        function(
            ctx,
            "clamp",
            iret,
            &[igen.clone(), igen.clone(), igen.clone()],
            Some(Op::Clamp),
        );
    }

    function(
        ctx,
        "cross",
        ret_float(3),
        &[gen_float(3), gen_float(3)],
        Some(Op::Cross),
    );

    // texturing: kept as calls so sampler-precision inheritance and the
    // gather checks run
    let vec2 = gen_float(2);
    let vec3 = gen_float(3);
    let vec4_ret = ret_float(4);
    let float_ret = ret_float(1);
    let s2d = sampler_param(SamplerScalar::Float, SamplerDim::Dim2D, false);
    let cube = sampler_param(SamplerScalar::Float, SamplerDim::Cube, false);
    let s2d_shadow = sampler_param(SamplerScalar::Float, SamplerDim::Dim2D, true);

    let modern = (es && version >= 300) || (!es && version >= 130);
    if modern {
        function(ctx, "texture", vec4_ret.clone(), &[s2d.clone(), vec2.clone()], None);
        function(ctx, "texture", vec4_ret.clone(), &[cube.clone(), vec3.clone()], None);
        function(
            ctx,
            "texture",
            float_ret,
            &[s2d_shadow.clone(), vec3.clone()],
            None,
        );
        function(
            ctx,
            "textureLod",
            vec4_ret.clone(),
            &[s2d.clone(), vec2.clone(), gen_float(1)],
            None,
        );
    }
    // the legacy names stay available outside the core profile
    if !modern || ctx.profile != Profile::Core {
        function(ctx, "texture2D", vec4_ret.clone(), &[s2d.clone(), vec2.clone()], None);
        function(ctx, "textureCube", vec4_ret.clone(), &[cube, vec3], None);
    }
    if !es {
        function(ctx, "textureGather", vec4_ret.clone(), &[s2d.clone(), vec2.clone()], None);
        function(
            ctx,
            "textureGather",
            vec4_ret,
            &[s2d, vec2, gen_int(1)],
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn seeded(version: u32, profile: Profile, stage: Stage) -> ParseContext {
        let mut ctx = ParseContext::new(Options::new(version, profile, stage));
        seed(&mut ctx);
        ctx.table.seal_builtins();
        ctx
    }

    #[test]
    fn vertex_stage_has_position() {
        let ctx = seeded(330, Profile::Core, Stage::Vertex);
        let found = ctx.table.find("gl_Position").expect("seeded");
        assert!(found.builtin);
        let symbol = ctx.table.get(found.handle);
        assert!(symbol.read_only);
        assert_eq!(symbol.ty.qualifier.storage, Storage::Position);
        assert_eq!(symbol.ty.vector_size, 4);

        assert!(ctx.table.find("gl_FragCoord").is_none());
    }

    #[test]
    fn fragment_stage_variables_by_version() {
        let ctx = seeded(100, Profile::Es, Stage::Fragment);
        assert!(ctx.table.find("gl_FragCoord").is_some());
        assert!(ctx.table.find("gl_FragColor").is_some());
        // no gl_FragDepth in 100 es
        assert!(ctx.table.find("gl_FragDepth").is_none());

        let ctx = seeded(300, Profile::Es, Stage::Fragment);
        assert!(ctx.table.find("gl_FragColor").is_none());
        assert!(ctx.table.find("gl_FragDepth").is_some());
    }

    #[test]
    fn function_library_overloads() {
        let ctx = seeded(330, Profile::Core, Stage::Fragment);
        // sin over all four genType sizes
        assert!(ctx.table.find("sin(f1;").is_some());
        assert!(ctx.table.find("sin(vf3;").is_some());
        // dot is vector-only
        assert!(ctx.table.find("dot(vf3;vf3;").is_some());
        assert!(ctx.table.find("dot(f1;f1;").is_none());
        // texture on 2D sampler
        assert!(ctx.table.find("texture(sf2;vf2;").is_some());
        // gather is desktop-only
        assert!(ctx.table.find("textureGather(sf2;vf2;").is_some());

        let ctx = seeded(100, Profile::Es, Stage::Fragment);
        assert!(ctx.table.find("textureGather(sf2;vf2;").is_none());
        assert!(ctx.table.find("texture2D(sf2;vf2;").is_some());
    }
}
