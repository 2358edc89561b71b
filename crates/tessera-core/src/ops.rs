//! # Operation Dispatch
//!
//! Names every validated constructor, declares its parameter list, and routes
//! bound arguments to the matching validator.
//!
//! ```rust
//! use tessera_core::{ArgValue, Operation};
//!
//! let args = Operation::RandomCrop.check(vec![ArgValue::from(32)], vec![]).unwrap();
//! assert_eq!(args.get("pad_if_needed"), &ArgValue::Bool(false));
//!
//! let err = Operation::RandomCrop.check(vec![ArgValue::from(0)], vec![]).unwrap_err();
//! assert_eq!(err.param(), Some("size"));
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::signature::{BoundArgs, Signature};
use crate::text::{self, validators as tv};
use crate::value::{ArgValue, Border, Inter};
use crate::vision::validators as vv;

/// A transform or vocabulary constructor whose arguments can be validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    // Vision
    Crop,
    ResizeInterpolation,
    Resize,
    RandomResizeCrop,
    Prob,
    NormalizeC,
    NormalizePy,
    RandomCrop,
    RandomColorAdjust,
    RandomRotation,
    TransformsList,
    RandomApply,
    TenCrop,
    NumChannels,
    Pad,
    RandomPerspective,
    MixUp,
    RandomErasing,
    Cutout,
    LinearTransform,
    RandomAffine,
    Rescale,
    UniformAugmentCpp,
    BoundingBoxAugmentCpp,
    UniformAugmentPy,
    PositiveDegrees,
    ComposeList,
    // Text
    Lookup,
    FromFile,
    FromList,
    FromDict,
    JiebaInit,
    JiebaAddWord,
    JiebaAddDict,
    FromDataset,
    Ngram,
    PairTruncate,
    ToNumber,
    PythonTokenizer,
}

impl Operation {
    /// Every operation, vision first.
    pub fn all() -> &'static [Operation] {
        &[
            Operation::Crop,
            Operation::ResizeInterpolation,
            Operation::Resize,
            Operation::RandomResizeCrop,
            Operation::Prob,
            Operation::NormalizeC,
            Operation::NormalizePy,
            Operation::RandomCrop,
            Operation::RandomColorAdjust,
            Operation::RandomRotation,
            Operation::TransformsList,
            Operation::RandomApply,
            Operation::TenCrop,
            Operation::NumChannels,
            Operation::Pad,
            Operation::RandomPerspective,
            Operation::MixUp,
            Operation::RandomErasing,
            Operation::Cutout,
            Operation::LinearTransform,
            Operation::RandomAffine,
            Operation::Rescale,
            Operation::UniformAugmentCpp,
            Operation::BoundingBoxAugmentCpp,
            Operation::UniformAugmentPy,
            Operation::PositiveDegrees,
            Operation::ComposeList,
            Operation::Lookup,
            Operation::FromFile,
            Operation::FromList,
            Operation::FromDict,
            Operation::JiebaInit,
            Operation::JiebaAddWord,
            Operation::JiebaAddDict,
            Operation::FromDataset,
            Operation::Ngram,
            Operation::PairTruncate,
            Operation::ToNumber,
            Operation::PythonTokenizer,
        ]
    }

    /// Snake-case name used on the wire and in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::ResizeInterpolation => "resize_interpolation",
            Self::Resize => "resize",
            Self::RandomResizeCrop => "random_resize_crop",
            Self::Prob => "prob",
            Self::NormalizeC => "normalize_c",
            Self::NormalizePy => "normalize_py",
            Self::RandomCrop => "random_crop",
            Self::RandomColorAdjust => "random_color_adjust",
            Self::RandomRotation => "random_rotation",
            Self::TransformsList => "transforms_list",
            Self::RandomApply => "random_apply",
            Self::TenCrop => "ten_crop",
            Self::NumChannels => "num_channels",
            Self::Pad => "pad",
            Self::RandomPerspective => "random_perspective",
            Self::MixUp => "mix_up",
            Self::RandomErasing => "random_erasing",
            Self::Cutout => "cutout",
            Self::LinearTransform => "linear_transform",
            Self::RandomAffine => "random_affine",
            Self::Rescale => "rescale",
            Self::UniformAugmentCpp => "uniform_augment_cpp",
            Self::BoundingBoxAugmentCpp => "bounding_box_augment_cpp",
            Self::UniformAugmentPy => "uniform_augment_py",
            Self::PositiveDegrees => "positive_degrees",
            Self::ComposeList => "compose_list",
            Self::Lookup => "lookup",
            Self::FromFile => "from_file",
            Self::FromList => "from_list",
            Self::FromDict => "from_dict",
            Self::JiebaInit => "jieba_init",
            Self::JiebaAddWord => "jieba_add_word",
            Self::JiebaAddDict => "jieba_add_dict",
            Self::FromDataset => "from_dataset",
            Self::Ngram => "ngram",
            Self::PairTruncate => "pair_truncate",
            Self::ToNumber => "to_number",
            Self::PythonTokenizer => "python_tokenizer",
        }
    }

    /// Constructor parameter list, with the defaults a caller gets for free.
    pub fn signature(self) -> Signature {
        let sig = Signature::new();
        match self {
            Self::Crop | Self::Resize => sig.required("size"),
            Self::ResizeInterpolation => sig
                .required("size")
                .optional("interpolation", Inter::Bilinear),
            Self::RandomResizeCrop => sig
                .required("size")
                .optional("scale", (0.08, 1.0))
                .optional("ratio", (3.0 / 4.0, 4.0 / 3.0))
                .optional("interpolation", Inter::Bilinear)
                .optional("max_attempts", 10),
            Self::Prob => sig.optional("prob", 0.5),
            Self::NormalizeC | Self::NormalizePy => sig.required("mean").required("std"),
            Self::RandomCrop => sig
                .required("size")
                .optional("padding", ArgValue::None)
                .optional("pad_if_needed", false)
                .optional("fill_value", 0)
                .optional("padding_mode", Border::Constant),
            Self::RandomColorAdjust => sig
                .optional("brightness", (1, 1))
                .optional("contrast", (1, 1))
                .optional("saturation", (1, 1))
                .optional("hue", (0, 0)),
            Self::RandomRotation => sig
                .required("degrees")
                .optional("resample", ArgValue::None)
                .optional("expand", false)
                .optional("center", ArgValue::None)
                .optional("fill_value", 0),
            Self::TransformsList | Self::ComposeList => sig.required("transforms"),
            Self::RandomApply => sig.required("transforms").optional("prob", 0.5),
            Self::TenCrop => sig.required("size").optional("use_vertical_flip", false),
            Self::NumChannels => sig.optional("num_output_channels", 1),
            Self::Pad => sig
                .required("padding")
                .optional("fill_value", 0)
                .optional("padding_mode", Border::Constant),
            Self::RandomPerspective => sig
                .optional("distortion_scale", 0.5)
                .optional("prob", 0.5)
                .optional("interpolation", Inter::Bicubic),
            Self::MixUp => sig
                .required("batch_size")
                .required("alpha")
                .optional("is_single", true),
            Self::RandomErasing => sig
                .optional("prob", 0.5)
                .optional("scale", (0.02, 0.33))
                .optional("ratio", (0.3, 3.3))
                .optional("value", 0)
                .optional("inplace", false)
                .optional("max_attempts", 10),
            Self::Cutout => sig.required("length").optional("num_patches", 1),
            Self::LinearTransform => sig
                .required("transformation_matrix")
                .required("mean_vector"),
            Self::RandomAffine => sig
                .required("degrees")
                .optional("translate", ArgValue::None)
                .optional("scale", ArgValue::None)
                .optional("shear", ArgValue::None)
                .optional("resample", Inter::Nearest)
                .optional("fill_value", 0),
            Self::Rescale => sig.required("rescale").required("shift"),
            Self::UniformAugmentCpp => sig.required("operations").optional("num_ops", 2),
            Self::BoundingBoxAugmentCpp => sig.required("transform").optional("ratio", 0.3),
            Self::UniformAugmentPy => sig.required("transforms").optional("num_ops", 2),
            Self::PositiveDegrees => sig.required("degrees"),
            Self::Lookup => sig.required("vocab").optional("unknown", ArgValue::None),
            Self::FromFile => sig
                .required("file_path")
                .optional("delimiter", "")
                .optional("vocab_size", ArgValue::None)
                .optional("special_tokens", ArgValue::None)
                .optional("special_first", true),
            Self::FromList => sig
                .required("word_list")
                .optional("special_tokens", ArgValue::None)
                .optional("special_first", true),
            Self::FromDict => sig.required("word_dict"),
            Self::JiebaInit => sig
                .required("hmm_path")
                .required("mp_path")
                .optional("mode", "mix"),
            Self::JiebaAddWord => sig.required("word").optional("freq", ArgValue::None),
            Self::JiebaAddDict => sig.required("user_dict"),
            Self::FromDataset => sig
                .required("dataset")
                .optional("columns", ArgValue::None)
                .optional("freq_range", ArgValue::None)
                .optional("top_k", ArgValue::None)
                .optional("special_tokens", ArgValue::None)
                .optional("special_first", true),
            Self::Ngram => sig
                .required("n")
                .optional("left_pad", ("", 0))
                .optional("right_pad", ("", 0))
                .optional("separator", " "),
            Self::PairTruncate => sig.required("max_length"),
            Self::ToNumber => sig.required("data_type"),
            Self::PythonTokenizer => sig.required("tokenizer"),
        }
    }

    /// Runs the validator for this operation over already bound arguments.
    ///
    /// Returns the arguments the constructor should proceed with. Only `ngram`
    /// and `from_dataset` rewrite anything.
    pub fn validate(self, mut args: BoundArgs) -> Result<BoundArgs> {
        let outcome = match self {
            Self::Crop => vv::check_crop(&args),
            Self::ResizeInterpolation => vv::check_resize_interpolation(&args),
            Self::Resize => vv::check_resize(&args),
            Self::RandomResizeCrop => vv::check_random_resize_crop(&args),
            Self::Prob => vv::check_prob(&args),
            Self::NormalizeC => vv::check_normalize_c(&args),
            Self::NormalizePy => vv::check_normalize_py(&args),
            Self::RandomCrop => vv::check_random_crop(&args),
            Self::RandomColorAdjust => vv::check_random_color_adjust(&args),
            Self::RandomRotation => vv::check_random_rotation(&args),
            Self::TransformsList => vv::check_transforms_list(&args),
            Self::RandomApply => vv::check_random_apply(&args),
            Self::TenCrop => vv::check_ten_crop(&args),
            Self::NumChannels => vv::check_num_channels(&args),
            Self::Pad => vv::check_pad(&args),
            Self::RandomPerspective => vv::check_random_perspective(&args),
            Self::MixUp => vv::check_mix_up(&args),
            Self::RandomErasing => vv::check_random_erasing(&args),
            Self::Cutout => vv::check_cutout(&args),
            Self::LinearTransform => vv::check_linear_transform(&args),
            Self::RandomAffine => vv::check_random_affine(&args),
            Self::Rescale => vv::check_rescale(&args),
            Self::UniformAugmentCpp => vv::check_uniform_augment_cpp(&args),
            Self::BoundingBoxAugmentCpp => vv::check_bounding_box_augment_cpp(&args),
            Self::UniformAugmentPy => vv::check_uniform_augment_py(&args),
            Self::PositiveDegrees => vv::check_positive_degrees(&args),
            Self::ComposeList => vv::check_compose_list(&args),
            Self::Lookup => tv::check_lookup(&args),
            Self::FromFile => text::check_from_file(&args),
            Self::FromList => text::check_from_list(&args),
            Self::FromDict => text::check_from_dict(&args),
            Self::JiebaInit => tv::check_jieba_init(&args),
            Self::JiebaAddWord => tv::check_jieba_add_word(&args),
            Self::JiebaAddDict => tv::check_jieba_add_dict(&args),
            Self::FromDataset => text::check_from_dataset(&mut args),
            Self::Ngram => tv::check_ngram(&mut args),
            Self::PairTruncate => tv::check_pair_truncate(&args),
            Self::ToNumber => tv::check_to_number(&args),
            Self::PythonTokenizer => tv::check_python_tokenizer(&args),
        };
        if let Err(err) = &outcome {
            debug!(op = self.name(), kind = ?err.kind(), "rejected constructor arguments: {err}");
        }
        outcome.map(|()| args)
    }

    /// Binds `positional` and `keyword` to the signature, then validates.
    pub fn check(
        self,
        positional: Vec<ArgValue>,
        keyword: Vec<(String, ArgValue)>,
    ) -> Result<BoundArgs> {
        let args = self.signature().bind(positional, keyword)?;
        self.validate(args)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Operation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| ValidationError::UnknownOperation(s.to_string()))
    }
}
